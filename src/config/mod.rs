// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Configuration module

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::simulation::FaultPolicy;
use crate::streaming::StreamingConfig;

/// Environment variable overriding the tick period (seconds)
pub const ENV_TICK_SECONDS: &str = "TICK_SECONDS";

/// Environment variable overriding the per-device history capacity
pub const ENV_MAX_HISTORY: &str = "MAX_HISTORY";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Seed the demo device population at start
    pub demo_mode: bool,

    /// Simulation configuration
    pub simulation: SimulationConfig,

    /// Streaming configuration
    pub streaming: StreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "MoistureSim".to_string(),
            log_level: "info".to_string(),
            demo_mode: true,
            simulation: SimulationConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("moisture-sim"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Apply `TICK_SECONDS` / `MAX_HISTORY` from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TICK_SECONDS) {
            self.simulation.tick_seconds = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a number: {:?}", ENV_TICK_SECONDS, raw))?;
        }
        if let Some(raw) = lookup(ENV_MAX_HISTORY) {
            self.simulation.max_history = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not an integer: {:?}", ENV_MAX_HISTORY, raw))?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if !sim.tick_seconds.is_finite() || sim.tick_seconds <= 0.0 {
            bail!("tick_seconds must be a positive number, got {}", sim.tick_seconds);
        }
        if sim.max_history == 0 {
            return Err(anyhow!("max_history must be at least 1"));
        }
        if sim.subscriber_buffer == 0 {
            return Err(anyhow!("subscriber_buffer must be at least 1"));
        }
        Ok(())
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tick period in seconds
    pub tick_seconds: f64,

    /// Readings retained per device
    pub max_history: usize,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,

    /// Whether fault spikes feed back into the trajectory
    pub fault_policy: FaultPolicy,

    /// Extra battery drain while watering, as a multiple of the base drain
    pub pump_load_factor: f64,

    /// Scale evaporation with the time-of-day temperature
    pub diurnal_evaporation: bool,

    /// Maximum fault spike on displayed moisture (%)
    pub fault_spike_moisture: f64,

    /// Maximum fault spike on displayed temperature (°C)
    pub fault_spike_temperature_c: f64,

    /// Amplitude of temperature noise (°C)
    pub temperature_noise_c: f64,

    /// Batches queued per subscriber before it is dropped
    pub subscriber_buffer: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0,
            max_history: 2000,
            seed: None,
            fault_policy: FaultPolicy::Cosmetic,
            pump_load_factor: 0.5,
            diurnal_evaporation: false,
            fault_spike_moisture: 4.0,
            fault_spike_temperature_c: 3.0,
            temperature_noise_c: 0.15,
            subscriber_buffer: 16,
        }
    }
}

impl SimulationConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.simulation.tick_seconds, 1.0);
        assert_eq!(config.simulation.max_history, 2000);
        assert_eq!(config.simulation.fault_policy, FaultPolicy::Cosmetic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[(ENV_TICK_SECONDS, "0.25"), (ENV_MAX_HISTORY, " 50 ")]))
            .unwrap();
        assert_eq!(config.simulation.tick_seconds, 0.25);
        assert_eq!(config.simulation.max_history, 50);
        assert_eq!(config.simulation.tick_period(), Duration::from_millis(250));
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = Config::default();
        assert!(config.apply_overrides(lookup(&[(ENV_MAX_HISTORY, "lots")])).is_err());

        let mut config = Config::default();
        config.apply_overrides(lookup(&[(ENV_TICK_SECONDS, "-1")])).unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.apply_overrides(lookup(&[(ENV_MAX_HISTORY, "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file() {
        let config: Config = toml::from_str(
            r#"
            demo_mode = false

            [simulation]
            tick_seconds = 2.5
            fault_policy = "drift"
            "#,
        )
        .unwrap();

        assert!(!config.demo_mode);
        assert_eq!(config.simulation.tick_seconds, 2.5);
        assert_eq!(config.simulation.fault_policy, FaultPolicy::Drift);
        assert_eq!(config.simulation.max_history, 2000);
        assert_eq!(config.streaming.websocket_port, 8765);
    }

    #[test]
    fn test_toml_round_trip_file() {
        let path = std::env::temp_dir()
            .join(format!("moisture-sim-{}", uuid::Uuid::new_v4()))
            .join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(created.simulation.max_history, loaded.simulation.max_history);
        assert_eq!(created.app_name, loaded.app_name);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
