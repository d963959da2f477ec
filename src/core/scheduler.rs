// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Tick scheduler - drives simulation and control on a fixed period

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::hub::{BroadcastHub, ReadingBatch};
use crate::control::ControlLoop;
use crate::devices::{DeviceStore, Reading, TickCommit};
use crate::simulation::SimulationModel;

/// Scheduler lifecycle within one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Summary of one completed tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub sequence: u64,
    /// Devices whose result was committed
    pub committed: usize,
    /// Devices that vanished mid-tick
    pub skipped: usize,
    /// Subscribers the batch reached
    pub delivered: usize,
    pub elapsed: Duration,
}

pub struct Scheduler {
    store: Arc<DeviceStore>,
    hub: Arc<BroadcastHub>,
    model: SimulationModel,
    control: ControlLoop,
    rng: Mutex<ChaCha8Rng>,
    /// Held for a whole tick so ticks never overlap
    tick_lock: Mutex<()>,
    tick_seconds: f64,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<DeviceStore>,
        hub: Arc<BroadcastHub>,
        model: SimulationModel,
        tick_seconds: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            store,
            hub,
            model,
            control: ControlLoop::new(),
            rng: Mutex::new(rng),
            tick_lock: Mutex::new(()),
            tick_seconds,
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_seconds
    }

    /// Run one full cycle: snapshot, simulate, decide, commit, broadcast
    pub fn tick(&self) -> TickReport {
        let _tick = self.tick_lock.lock();
        let started = Instant::now();
        self.running.store(true, Ordering::Release);

        let now = Utc::now();
        let snapshot = self.store.snapshot();

        // One sub-seed per device keeps runs reproducible under parallelism
        let seeds: Vec<u64> = {
            let mut rng = self.rng.lock();
            snapshot.iter().map(|_| rng.gen()).collect()
        };

        let commits: Vec<(String, TickCommit)> = snapshot
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(device, seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                let outcome = self.model.step(device, now, self.tick_seconds, &mut rng);
                let decision = self.control.decide_for(device, outcome.next.moisture);
                (
                    device.id.clone(),
                    TickCommit {
                        outcome,
                        watering: decision.target(),
                    },
                )
            })
            .collect();

        let mut readings: Vec<Reading> = Vec::with_capacity(commits.len());
        let mut skipped = 0;
        for (id, commit) in commits {
            match self.store.apply_simulation(&id, commit) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    debug!("Skipping device {} this tick: {}", id, e);
                    skipped += 1;
                }
            }
        }

        // Devices deleted after their commit are left out of the batch
        let committed = readings.len();
        let sequence = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let delivered = self.store.with_live_readings(readings, |live| {
            self.hub.publish(ReadingBatch::new(sequence, live))
        });

        self.running.store(false, Ordering::Release);

        let report = TickReport {
            sequence,
            committed,
            skipped,
            delivered,
            elapsed: started.elapsed(),
        };
        debug!(
            "Tick {} committed {} devices ({} skipped) to {} subscribers in {:?}",
            report.sequence, report.committed, report.skipped, report.delivered, report.elapsed
        );
        report
    }

    /// Tick every period until shutdown. Overrunning periods are skipped, not made up.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs_f64(self.tick_seconds);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Tick scheduler started ({:?} period)", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || scheduler.tick()).await {
                        error!("Tick task failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Tick scheduler shutting down...");
                    break;
                }
            }
        }
    }
}
