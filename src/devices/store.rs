// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Device store - authoritative in-memory device records
//!
//! The device map is only write-locked to insert or remove entries. Every
//! mutation of an existing device goes through that device's own mutex, so
//! a tick commit and a command for the same device never interleave while
//! unrelated devices proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{
    Device, DeviceCreate, DeviceStatus, DeviceUpdate, HistoryBuffer, PhysicalState, Reading,
};
use crate::error::{EngineError, EngineResult};
use crate::simulation::{self, StepOutcome};

struct DeviceSlot {
    device: Device,
    history: HistoryBuffer,
    removed: bool,
}

struct DeviceCell {
    seq: u64,
    slot: Mutex<DeviceSlot>,
}

/// Result of one tick for one device, committed atomically
#[derive(Debug, Clone)]
pub struct TickCommit {
    /// Simulation output computed against a snapshot
    pub outcome: StepOutcome,
    /// Control loop decision, `None` leaves watering untouched
    pub watering: Option<bool>,
}

/// Owns every device and its history
pub struct DeviceStore {
    devices: RwLock<HashMap<String, Arc<DeviceCell>>>,
    next_seq: AtomicU64,
    max_history: usize,
}

impl DeviceStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn cell(&self, id: &str) -> EngineResult<Arc<DeviceCell>> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Run `f` with exclusive access to a live device
    fn with_slot<T>(&self, id: &str, f: impl FnOnce(&mut DeviceSlot) -> EngineResult<T>) -> EngineResult<T> {
        let cell = self.cell(id)?;
        let mut slot = cell.slot.lock();
        if slot.removed {
            return Err(EngineError::not_found(id));
        }
        f(&mut *slot)
    }

    fn cells_in_order(&self) -> Vec<Arc<DeviceCell>> {
        let mut cells: Vec<Arc<DeviceCell>> = self.devices.read().values().cloned().collect();
        cells.sort_by_key(|c| c.seq);
        cells
    }

    /// Create a device and record its initial reading
    pub fn create(&self, request: DeviceCreate) -> EngineResult<Device> {
        request.validate()?;
        let config = request.resolved_config();
        config.validate()?;

        let now = Utc::now();
        let device = Device {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            plant_type: request.plant_type,
            location: request.location,
            created_at: now,
            updated_at: now,
            status: DeviceStatus::Ok,
            battery: request.battery,
            watering: false,
            moisture: request.initial_moisture,
            temperature_c: simulation::diurnal_temperature(now, &config),
            config,
        };

        let mut history = HistoryBuffer::new(self.max_history);
        history.push(reading_of(&device, device.physical(), now));

        let cell = Arc::new(DeviceCell {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            slot: Mutex::new(DeviceSlot {
                device: device.clone(),
                history,
                removed: false,
            }),
        });
        self.devices.write().insert(device.id.clone(), cell);

        info!("Created device {} ({})", device.name, device.id);
        Ok(device)
    }

    pub fn get(&self, id: &str) -> EngineResult<Device> {
        self.with_slot(id, |slot| Ok(slot.device.clone()))
    }

    /// All devices in creation order
    pub fn list(&self) -> Vec<Device> {
        self.cells_in_order()
            .into_iter()
            .filter_map(|cell| {
                let slot = cell.slot.lock();
                if slot.removed {
                    None
                } else {
                    Some(slot.device.clone())
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.read().contains_key(id)
    }

    pub fn update(&self, id: &str, update: DeviceUpdate) -> EngineResult<Device> {
        update.validate()?;
        self.with_slot(id, |slot| {
            let mut config = slot.device.config.clone();
            if let Some(ref patch) = update.config {
                config.merge(patch);
                config.validate()?;
            }

            let device = &mut slot.device;
            if let Some(name) = update.name {
                device.name = name;
            }
            if let Some(plant_type) = update.plant_type {
                device.plant_type = plant_type;
            }
            if let Some(location) = update.location {
                device.location = Some(location);
            }
            device.config = config;
            device.updated_at = Utc::now();

            debug!("Updated device {}", device.id);
            Ok(device.clone())
        })
    }

    /// Remove a device and discard its history
    pub fn delete(&self, id: &str) -> EngineResult<()> {
        let cell = self
            .devices
            .write()
            .remove(id)
            .ok_or_else(|| EngineError::not_found(id))?;

        // In-flight holders of the cell must see it as gone
        cell.slot.lock().removed = true;

        info!("Deleted device {}", id);
        Ok(())
    }

    /// Manual watering command, rejected while the device is offline
    pub fn set_watering(&self, id: &str, on: bool) -> EngineResult<Device> {
        self.with_slot(id, |slot| {
            let device = &mut slot.device;
            if device.status == DeviceStatus::Offline {
                return Err(EngineError::offline());
            }
            device.watering = on;
            device.updated_at = Utc::now();

            debug!("Device {} watering set to {}", device.id, on);
            Ok(device.clone())
        })
    }

    pub fn set_status(&self, id: &str, status: DeviceStatus) -> EngineResult<Device> {
        self.with_slot(id, |slot| {
            let device = &mut slot.device;
            device.status = status;
            device.updated_at = Utc::now();

            debug!("Device {} status set to {}", device.id, status);
            Ok(device.clone())
        })
    }

    pub fn latest_reading(&self, id: &str) -> EngineResult<Reading> {
        self.with_slot(id, |slot| {
            slot.history
                .latest()
                .cloned()
                .ok_or_else(|| EngineError::not_found(id))
        })
    }

    /// Up to `limit` most recent readings, newest last
    pub fn history(&self, id: &str, limit: usize) -> EngineResult<Vec<Reading>> {
        let limit = limit.clamp(1, self.max_history);
        self.with_slot(id, |slot| Ok(slot.history.tail(limit)))
    }

    /// Latest reading of every live device, in creation order
    pub fn latest_readings(&self) -> Vec<Reading> {
        latest_of(&self.devices.read())
    }

    /// Run `f` on the latest readings while deletes are held off
    pub fn with_latest_readings<T>(&self, f: impl FnOnce(Vec<Reading>) -> T) -> T {
        let devices = self.devices.read();
        f(latest_of(&devices))
    }

    /// Drop readings of devices deleted since their commit, then run `f` on
    /// the rest. No delete completes until `f` returns.
    pub fn with_live_readings<T>(
        &self,
        mut readings: Vec<Reading>,
        f: impl FnOnce(Vec<Reading>) -> T,
    ) -> T {
        let devices = self.devices.read();
        readings.retain(|r| devices.contains_key(&r.device_id));
        f(readings)
    }

    /// Consistent per-device copies for a tick to compute against
    pub fn snapshot(&self) -> Vec<Device> {
        self.list()
    }

    /// Commit one tick's result for a device and append its reading.
    ///
    /// Reports `NotFound` when the device was deleted after the snapshot.
    /// When the status changed since the snapshot the computed step no longer
    /// applies; the device keeps its physical state and the reading repeats it.
    pub fn apply_simulation(&self, id: &str, commit: TickCommit) -> EngineResult<Reading> {
        self.with_slot(id, |slot| {
            let StepOutcome { next, reading } = commit.outcome;
            let device = &mut slot.device;

            let reading = if device.status == reading.status {
                device.set_physical(next);
                if let Some(on) = commit.watering {
                    device.watering = on;
                }
                Reading {
                    watering: device.watering,
                    ..reading
                }
            } else {
                reading_of(device, device.physical(), reading.timestamp)
            };

            device.updated_at = reading.timestamp;
            slot.history.push(reading.clone());
            Ok(reading)
        })
    }
}

fn latest_of(devices: &HashMap<String, Arc<DeviceCell>>) -> Vec<Reading> {
    let mut cells: Vec<&Arc<DeviceCell>> = devices.values().collect();
    cells.sort_by_key(|c| c.seq);
    cells
        .into_iter()
        .filter_map(|cell| {
            let slot = cell.slot.lock();
            if slot.removed {
                None
            } else {
                slot.history.latest().cloned()
            }
        })
        .collect()
}

fn reading_of(device: &Device, state: PhysicalState, timestamp: DateTime<Utc>) -> Reading {
    Reading {
        timestamp,
        device_id: device.id.clone(),
        moisture: simulation::round2(state.moisture),
        temperature_c: simulation::round2(state.temperature_c),
        battery: simulation::round2(state.battery),
        watering: device.watering,
        status: device.status,
    }
}
