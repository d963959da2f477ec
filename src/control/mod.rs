// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Control loop - hysteresis watering policy for auto-mode devices

use serde::{Deserialize, Serialize};

use crate::devices::{Device, DeviceConfig, DeviceStatus};

/// Outcome of one control evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WateringDecision {
    TurnOn,
    TurnOff,
    Hold,
}

impl WateringDecision {
    /// Watering state to commit, `None` for no change
    pub fn target(self) -> Option<bool> {
        match self {
            WateringDecision::TurnOn => Some(true),
            WateringDecision::TurnOff => Some(false),
            WateringDecision::Hold => None,
        }
    }
}

/// Stateless auto-mode controller
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlLoop;

impl ControlLoop {
    pub fn new() -> Self {
        Self
    }

    /// Only healthy devices in auto mode are managed
    pub fn applies(&self, status: DeviceStatus, config: &DeviceConfig) -> bool {
        status == DeviceStatus::Ok && config.auto_mode
    }

    /// Decide against the freshly simulated `moisture`.
    ///
    /// Inside the `[min_threshold, max_threshold]` band nothing changes.
    pub fn decide(&self, status: DeviceStatus, config: &DeviceConfig, moisture: f64) -> WateringDecision {
        if !self.applies(status, config) {
            return WateringDecision::Hold;
        }
        if moisture < config.min_threshold {
            WateringDecision::TurnOn
        } else if moisture > config.max_threshold {
            WateringDecision::TurnOff
        } else {
            WateringDecision::Hold
        }
    }

    pub fn decide_for(&self, device: &Device, moisture: f64) -> WateringDecision {
        self.decide(device.status, &device.config, moisture)
    }
}
