// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Device, configuration and reading types

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const MAX_NAME_LEN: usize = 120;
const MAX_PLANT_TYPE_LEN: usize = 80;
const MAX_LOCATION_LEN: usize = 120;

/// Device operational status, changed only by explicit command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Ok,
    Fault,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Ok => "ok",
            DeviceStatus::Fault => "fault",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Ok
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(DeviceStatus::Ok),
            "fault" => Ok(DeviceStatus::Fault),
            "offline" => Ok(DeviceStatus::Offline),
            other => Err(EngineError::InvalidStatus(other.to_string())),
        }
    }
}

/// Per-device simulation and control parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Lower edge of the hysteresis band (moisture %)
    pub min_threshold: f64,
    /// Upper edge of the hysteresis band (moisture %)
    pub max_threshold: f64,
    /// Moisture lost to evaporation (%/s)
    pub evaporation_rate: f64,
    /// Moisture gained while watering (%/s)
    pub irrigation_rate: f64,
    /// Moisture lost to drainage (%/s)
    pub leak_rate: f64,
    /// Amplitude of the zero-mean moisture noise
    pub noise: f64,
    /// Let the control loop manage watering
    pub auto_mode: bool,
    /// Daily mean temperature (°C)
    pub temp_mean_c: f64,
    /// Diurnal temperature amplitude (°C)
    pub temp_amp_c: f64,
    /// Battery drain (%/hour)
    pub battery_drain_per_hour: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            min_threshold: 25.0,
            max_threshold: 60.0,
            evaporation_rate: 0.015,
            irrigation_rate: 0.25,
            leak_rate: 0.0,
            noise: 0.35,
            auto_mode: false,
            temp_mean_c: 22.0,
            temp_amp_c: 4.0,
            battery_drain_per_hour: 0.2,
        }
    }
}

impl DeviceConfig {
    /// Validate a configuration coming from the command interface
    pub fn validate(&self) -> EngineResult<()> {
        check_range("min_threshold", self.min_threshold, 0.0, 100.0)?;
        check_range("max_threshold", self.max_threshold, 0.0, 100.0)?;
        if self.min_threshold >= self.max_threshold {
            return Err(EngineError::validation(
                "min_threshold must be lower than max_threshold",
            ));
        }
        check_range("evaporation_rate", self.evaporation_rate, 0.0, 5.0)?;
        check_range("irrigation_rate", self.irrigation_rate, 0.0, 5.0)?;
        check_range("leak_rate", self.leak_rate, 0.0, 2.0)?;
        check_range("noise", self.noise, 0.0, 10.0)?;
        check_range("battery_drain_per_hour", self.battery_drain_per_hour, 0.0, 10.0)?;
        check_range("temp_amp_c", self.temp_amp_c, 0.0, f64::MAX)?;
        if !self.temp_mean_c.is_finite() {
            return Err(EngineError::validation("temp_mean_c must be finite"));
        }
        Ok(())
    }

    /// Field-wise merge of a partial configuration
    pub fn merge(&mut self, patch: &DeviceConfigPatch) {
        if let Some(v) = patch.min_threshold { self.min_threshold = v; }
        if let Some(v) = patch.max_threshold { self.max_threshold = v; }
        if let Some(v) = patch.evaporation_rate { self.evaporation_rate = v; }
        if let Some(v) = patch.irrigation_rate { self.irrigation_rate = v; }
        if let Some(v) = patch.leak_rate { self.leak_rate = v; }
        if let Some(v) = patch.noise { self.noise = v; }
        if let Some(v) = patch.auto_mode { self.auto_mode = v; }
        if let Some(v) = patch.temp_mean_c { self.temp_mean_c = v; }
        if let Some(v) = patch.temp_amp_c { self.temp_amp_c = v; }
        if let Some(v) = patch.battery_drain_per_hour { self.battery_drain_per_hour = v; }
    }
}

fn check_range(field: &str, value: f64, lo: f64, hi: f64) -> EngineResult<()> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "{} must be within [{}, {}], got {}",
            field, lo, hi, value
        )))
    }
}

/// Partial configuration, only supplied fields are applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfigPatch {
    pub min_threshold: Option<f64>,
    pub max_threshold: Option<f64>,
    pub evaporation_rate: Option<f64>,
    pub irrigation_rate: Option<f64>,
    pub leak_rate: Option<f64>,
    pub noise: Option<f64>,
    pub auto_mode: Option<bool>,
    pub temp_mean_c: Option<f64>,
    pub temp_amp_c: Option<f64>,
    pub battery_drain_per_hour: Option<f64>,
}

/// Device creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCreate {
    pub name: String,
    #[serde(default = "default_plant_type")]
    pub plant_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_moisture")]
    pub initial_moisture: f64,
    #[serde(default = "default_battery")]
    pub battery: f64,
    #[serde(default)]
    pub config: Option<DeviceConfigPatch>,
}

fn default_plant_type() -> String {
    "generic".to_string()
}

fn default_moisture() -> f64 {
    50.0
}

fn default_battery() -> f64 {
    100.0
}

impl DeviceCreate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plant_type: default_plant_type(),
            location: None,
            initial_moisture: default_moisture(),
            battery: default_battery(),
            config: None,
        }
    }

    pub fn plant_type(mut self, plant_type: &str) -> Self {
        self.plant_type = plant_type.to_string();
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn initial_moisture(mut self, moisture: f64) -> Self {
        self.initial_moisture = moisture;
        self
    }

    pub fn battery(mut self, battery: f64) -> Self {
        self.battery = battery;
        self
    }

    pub fn config(mut self, config: DeviceConfigPatch) -> Self {
        self.config = Some(config);
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        check_name(&self.name)?;
        check_len("plant_type", &self.plant_type, MAX_PLANT_TYPE_LEN)?;
        if let Some(ref location) = self.location {
            check_len("location", location, MAX_LOCATION_LEN)?;
        }
        check_range("initial_moisture", self.initial_moisture, 0.0, 100.0)?;
        check_range("battery", self.battery, 0.0, 100.0)?;
        Ok(())
    }

    /// Configuration after applying the supplied fields over the defaults
    pub fn resolved_config(&self) -> DeviceConfig {
        let mut config = DeviceConfig::default();
        if let Some(ref patch) = self.config {
            config.merge(patch);
        }
        config
    }
}

/// Partial device update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub plant_type: Option<String>,
    pub location: Option<String>,
    pub config: Option<DeviceConfigPatch>,
}

impl DeviceUpdate {
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(ref name) = self.name {
            check_name(name)?;
        }
        if let Some(ref plant_type) = self.plant_type {
            check_len("plant_type", plant_type, MAX_PLANT_TYPE_LEN)?;
        }
        if let Some(ref location) = self.location {
            check_len("location", location, MAX_LOCATION_LEN)?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::validation("name must not be empty"));
    }
    check_len("name", name, MAX_NAME_LEN)
}

fn check_len(field: &str, value: &str, max: usize) -> EngineResult<()> {
    if value.chars().count() > max {
        Err(EngineError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )))
    } else {
        Ok(())
    }
}

/// A simulated soil-moisture sensor with a watering actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub plant_type: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Live physical state
    pub status: DeviceStatus,
    pub battery: f64,
    pub watering: bool,
    pub moisture: f64,
    pub temperature_c: f64,

    pub config: DeviceConfig,
}

/// Physical quantities advanced by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    pub moisture: f64,
    pub battery: f64,
    pub temperature_c: f64,
}

impl Device {
    pub fn physical(&self) -> PhysicalState {
        PhysicalState {
            moisture: self.moisture,
            battery: self.battery,
            temperature_c: self.temperature_c,
        }
    }

    pub(crate) fn set_physical(&mut self, state: PhysicalState) {
        self.moisture = state.moisture.clamp(0.0, 100.0);
        self.battery = state.battery.clamp(0.0, 100.0);
        self.temperature_c = state.temperature_c;
    }
}

/// Immutable telemetry snapshot, one per device per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub moisture: f64,
    pub temperature_c: f64,
    pub battery: f64,
    pub watering: bool,
    pub status: DeviceStatus,
}
