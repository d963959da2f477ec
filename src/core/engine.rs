//! Engine facade - the interface the command and streaming layers call

use std::sync::Arc;
use std::time::Instant;
use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::devices::{
    Device, DeviceConfigPatch, DeviceCreate, DeviceStatus, DeviceStore, DeviceUpdate, Reading,
};
use crate::error::EngineResult;
use crate::simulation::SimulationModel;
use super::hub::{BroadcastHub, ReadingBatch, Subscription};
use super::scheduler::{Scheduler, TickReport};
use super::EngineHealth;

/// Device telemetry simulation and control engine
pub struct Engine {
    pub config: Arc<Config>,
    store: Arc<DeviceStore>,
    hub: Arc<BroadcastHub>,
    scheduler: Arc<Scheduler>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    start_time: Mutex<Option<Instant>>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let sim = &config.simulation;

        let store = Arc::new(DeviceStore::new(sim.max_history));
        let hub = Arc::new(BroadcastHub::new(sim.subscriber_buffer));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            hub.clone(),
            SimulationModel::new(sim),
            sim.tick_seconds,
            sim.seed,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            hub,
            scheduler,
            shutdown_tx,
            task: Mutex::new(None),
            start_time: Mutex::new(None),
        })
    }

    /// Spawn the tick scheduler on the current tokio runtime
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            warn!("Engine already running");
            return;
        }

        info!("Starting simulation engine...");
        let scheduler = self.scheduler.clone();
        *task = Some(tokio::spawn(scheduler.run(self.shutdown_tx.subscribe())));
        *self.start_time.lock() = Some(Instant::now());
        info!("Simulation engine started");
    }

    pub async fn stop(&self) {
        info!("Stopping simulation engine...");
        let _ = self.shutdown_tx.send(());

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        *self.start_time.lock() = None;
        info!("Simulation engine stopped");
    }

    /// Run one tick immediately, outside the periodic schedule
    pub fn tick_now(&self) -> TickReport {
        self.scheduler.tick()
    }

    pub fn create_device(&self, request: DeviceCreate) -> EngineResult<Device> {
        self.store.create(request)
    }

    pub fn get_device(&self, id: &str) -> EngineResult<Device> {
        self.store.get(id)
    }

    pub fn list_devices(&self) -> Vec<Device> {
        self.store.list()
    }

    pub fn update_device(&self, id: &str, update: DeviceUpdate) -> EngineResult<Device> {
        self.store.update(id, update)
    }

    pub fn delete_device(&self, id: &str) -> EngineResult<()> {
        self.store.delete(id)
    }

    pub fn set_watering(&self, id: &str, on: bool) -> EngineResult<Device> {
        self.store.set_watering(id, on)
    }

    /// Set status from its wire name: "ok", "fault" or "offline"
    pub fn set_status(&self, id: &str, status: &str) -> EngineResult<Device> {
        let status: DeviceStatus = status.parse()?;
        self.store.set_status(id, status)
    }

    pub fn latest_reading(&self, id: &str) -> EngineResult<Reading> {
        self.store.latest_reading(id)
    }

    /// At most `limit` readings (clamped to `[1, max_history]`), newest last
    pub fn history(&self, id: &str, limit: usize) -> EngineResult<Vec<Reading>> {
        self.store.history(id, limit)
    }

    /// Live batches, starting with the latest reading of every device
    pub fn subscribe(&self) -> Subscription {
        // Store guard first, then the hub registry, the same order a tick publishes in
        self.store.with_latest_readings(|readings| {
            self.hub.subscribe_with(|| ReadingBatch::new(0, readings))
        })
    }

    pub fn unsubscribe(&self, subscription_id: u64) -> bool {
        self.hub.unsubscribe(subscription_id)
    }

    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            running: self.task.lock().as_ref().map(|t| !t.is_finished()).unwrap_or(false),
            tick_count: self.scheduler.tick_count(),
            devices: self.store.len(),
            subscribers: self.hub.subscriber_count(),
            tick_seconds: self.scheduler.tick_seconds(),
            uptime_seconds: self.uptime(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.lock().map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Populate an empty engine with a few sample plants
    pub fn seed_demo_devices(&self) -> EngineResult<Vec<Device>> {
        if !self.store.is_empty() {
            return Ok(Vec::new());
        }

        let demo = vec![
            DeviceCreate::new("Monstera - Office")
                .plant_type("monstera")
                .location("Office")
                .initial_moisture(58.0),
            DeviceCreate::new("Fiddle Leaf Fig")
                .plant_type("ficus")
                .location("Living Room")
                .initial_moisture(42.0)
                .battery(86.0),
            DeviceCreate::new("Cactus")
                .plant_type("cactus")
                .location("Kitchen")
                .initial_moisture(22.0)
                .battery(92.0)
                .config(DeviceConfigPatch {
                    min_threshold: Some(10.0),
                    max_threshold: Some(35.0),
                    evaporation_rate: Some(0.01),
                    irrigation_rate: Some(0.2),
                    noise: Some(0.2),
                    ..Default::default()
                }),
        ];

        let devices = demo
            .into_iter()
            .map(|request| self.store.create(request))
            .collect::<EngineResult<Vec<_>>>()?;
        info!("Seeded {} demo devices", devices.len());
        Ok(devices)
    }
}
