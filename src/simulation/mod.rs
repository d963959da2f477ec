// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Simulation model - advances a device's physical state by one tick
//!
//! `SimulationModel::step` is pure: it reads a device snapshot, draws from
//! the supplied RNG and returns the next physical state together with the
//! reading to display. Committing the result is the scheduler's job.
//!
//! Stochastic terms are clipped normals, `N(0, a/2)` truncated to `[-a, a]`,
//! so they stay zero-mean and bounded by their configured amplitude `a`.
//! Moisture noise scales with `sqrt(dt)` like a random walk.

use std::f64::consts::PI;
use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::devices::{Device, DeviceConfig, DeviceStatus, PhysicalState, Reading};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Maximum evaporation boost on the warm side of the day
const MAX_HEAT_FACTOR: f64 = 0.3;

/// How a fault spike interacts with the simulated trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Spike only the displayed reading, the trajectory is unaffected
    Cosmetic,
    /// Moisture spikes are folded into the physical state
    Drift,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        FaultPolicy::Cosmetic
    }
}

/// Output of one simulation step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Baseline for the next tick
    pub next: PhysicalState,
    /// What the sensor reports for this tick
    pub reading: Reading,
}

/// Numeric soil/battery/temperature model
#[derive(Debug, Clone)]
pub struct SimulationModel {
    fault_policy: FaultPolicy,
    pump_load_factor: f64,
    diurnal_evaporation: bool,
    fault_spike_moisture: f64,
    fault_spike_temperature_c: f64,
    temperature_noise_c: f64,
}

impl Default for SimulationModel {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl SimulationModel {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            fault_policy: config.fault_policy,
            pump_load_factor: non_negative(config.pump_load_factor),
            diurnal_evaporation: config.diurnal_evaporation,
            fault_spike_moisture: non_negative(config.fault_spike_moisture),
            fault_spike_temperature_c: non_negative(config.fault_spike_temperature_c),
            temperature_noise_c: non_negative(config.temperature_noise_c),
        }
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Advance `device` by `dt` seconds ending at `now`
    pub fn step<R: Rng + ?Sized>(
        &self,
        device: &Device,
        now: DateTime<Utc>,
        dt: f64,
        rng: &mut R,
    ) -> StepOutcome {
        if device.status == DeviceStatus::Offline {
            // Not reporting: nothing evolves, the last values are repeated
            let next = device.physical();
            return StepOutcome {
                next,
                reading: display(device, next, now),
            };
        }

        let cfg = &device.config;
        let dt = non_negative(dt);

        let mut evaporation = non_negative(cfg.evaporation_rate);
        if self.diurnal_evaporation {
            evaporation *= 1.0 + heat_factor(now, cfg);
        }
        let mut delta = -(evaporation + non_negative(cfg.leak_rate)) * dt;
        if device.watering {
            delta += non_negative(cfg.irrigation_rate) * dt;
        }
        delta += bounded_noise(rng, non_negative(cfg.noise)) * dt.sqrt();
        let moisture = clamp_percent(device.moisture + delta);

        let temperature_c = diurnal_temperature(now, cfg)
            + bounded_noise(rng, self.temperature_noise_c);

        let mut drain = non_negative(cfg.battery_drain_per_hour) * dt / 3600.0;
        if device.watering {
            drain *= 1.0 + self.pump_load_factor;
        }
        let battery = clamp_percent(device.battery - drain);

        let mut next = PhysicalState {
            moisture,
            battery,
            temperature_c,
        };
        let mut shown = next;

        if device.status == DeviceStatus::Fault {
            let (spike_moisture, spike_temperature) = match rng.gen_range(0..3) {
                0 => (true, false),
                1 => (false, true),
                _ => (true, true),
            };
            if spike_moisture {
                shown.moisture = clamp_percent(
                    shown.moisture + spike(rng, self.fault_spike_moisture),
                );
                if self.fault_policy == FaultPolicy::Drift {
                    next.moisture = shown.moisture;
                }
            }
            if spike_temperature {
                shown.temperature_c += spike(rng, self.fault_spike_temperature_c);
            }
        }

        StepOutcome {
            next,
            reading: display(device, shown, now),
        }
    }
}

fn display(device: &Device, state: PhysicalState, now: DateTime<Utc>) -> Reading {
    Reading {
        timestamp: now,
        device_id: device.id.clone(),
        moisture: round2(state.moisture),
        temperature_c: round2(state.temperature_c),
        battery: round2(state.battery),
        watering: device.watering,
        status: device.status,
    }
}

/// 24-hour periodic phase in [-1, 1], lowest at midnight UTC, highest at noon
pub fn diurnal_phase(ts: DateTime<Utc>) -> f64 {
    let seconds = ts.num_seconds_from_midnight() as f64 + ts.nanosecond() as f64 * 1e-9;
    (2.0 * PI * seconds / SECONDS_PER_DAY - PI / 2.0).sin()
}

/// Noise-free air temperature for a device at `ts`
pub fn diurnal_temperature(ts: DateTime<Utc>, cfg: &DeviceConfig) -> f64 {
    let mean = if cfg.temp_mean_c.is_finite() {
        cfg.temp_mean_c
    } else {
        DeviceConfig::default().temp_mean_c
    };
    mean + non_negative(cfg.temp_amp_c) * diurnal_phase(ts)
}

/// Evaporation boost from warmer-than-mean air, in [0, 0.3]
pub fn heat_factor(ts: DateTime<Utc>, cfg: &DeviceConfig) -> f64 {
    (non_negative(cfg.temp_amp_c) * diurnal_phase(ts) / 10.0).clamp(0.0, MAX_HEAT_FACTOR)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn clamp_percent(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 100.0)
    }
}

/// Negative, NaN and infinite parameters count as zero
fn non_negative(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

fn bounded_noise<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude <= 0.0 {
        return 0.0;
    }
    match Normal::new(0.0, amplitude / 2.0) {
        Ok(normal) => normal.sample(rng).clamp(-amplitude, amplitude),
        Err(_) => 0.0,
    }
}

/// Magnitude in (0, max], sign up or down with equal odds
fn spike<R: Rng + ?Sized>(rng: &mut R, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    let magnitude = max * (1.0 - rng.gen::<f64>());
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn device(config: DeviceConfig) -> Device {
        let now = Utc::now();
        Device {
            id: "dev-1".to_string(),
            name: "Test".to_string(),
            plant_type: "generic".to_string(),
            location: None,
            created_at: now,
            updated_at: now,
            status: DeviceStatus::Ok,
            battery: 100.0,
            watering: false,
            moisture: 50.0,
            temperature_c: 22.0,
            config,
        }
    }

    fn advance(model: &SimulationModel, device: &mut Device, rng: &mut ChaCha8Rng) -> Reading {
        let outcome = model.step(device, Utc::now(), 1.0, rng);
        device.set_physical(outcome.next);
        outcome.reading
    }

    fn quiet_model() -> SimulationModel {
        SimulationModel::new(&SimulationConfig {
            temperature_noise_c: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_diurnal_phase_bounds() {
        let midnight = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert!((diurnal_phase(midnight) + 1.0).abs() < 1e-9);
        assert!((diurnal_phase(noon) - 1.0).abs() < 1e-9);

        for hour in 0..24 {
            let ts = Utc.with_ymd_and_hms(2026, 6, 1, hour, 17, 3).unwrap();
            let phase = diurnal_phase(ts);
            assert!((-1.0..=1.0).contains(&phase));
        }
    }

    #[test]
    fn test_state_stays_in_bounds() {
        let model = SimulationModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let configs = [
            DeviceConfig { noise: 10.0, irrigation_rate: 5.0, ..Default::default() },
            DeviceConfig { noise: 10.0, evaporation_rate: 5.0, leak_rate: 2.0, ..Default::default() },
            DeviceConfig { battery_drain_per_hour: 10.0, ..Default::default() },
        ];

        for config in configs {
            for status in [DeviceStatus::Ok, DeviceStatus::Fault] {
                let mut dev = device(config.clone());
                dev.status = status;
                dev.watering = config.irrigation_rate > 1.0;
                for _ in 0..2000 {
                    let outcome = model.step(&dev, Utc::now(), 60.0, &mut rng);
                    dev.set_physical(outcome.next);
                    assert!((0.0..=100.0).contains(&dev.moisture));
                    assert!((0.0..=100.0).contains(&dev.battery));
                    assert!((0.0..=100.0).contains(&outcome.reading.moisture));
                    assert!((0.0..=100.0).contains(&outcome.reading.battery));
                }
            }
        }
    }

    #[test]
    fn test_watering_does_not_decrease_moisture() {
        let model = quiet_model();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut dev = device(DeviceConfig {
            noise: 0.0,
            leak_rate: 0.0,
            evaporation_rate: 0.1,
            irrigation_rate: 0.3,
            ..Default::default()
        });
        dev.watering = true;

        for _ in 0..100 {
            let before = dev.moisture;
            advance(&model, &mut dev, &mut rng);
            assert!(dev.moisture >= before);
        }
        assert!((dev.moisture - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_drying_without_watering() {
        let model = quiet_model();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut dev = device(DeviceConfig {
            noise: 0.0,
            evaporation_rate: 0.5,
            leak_rate: 0.5,
            ..Default::default()
        });

        advance(&model, &mut dev, &mut rng);
        assert!((dev.moisture - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_offline_is_frozen() {
        let model = SimulationModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut dev = device(DeviceConfig {
            noise: 5.0,
            battery_drain_per_hour: 10.0,
            ..Default::default()
        });
        dev.status = DeviceStatus::Offline;
        dev.watering = true;

        let first = advance(&model, &mut dev, &mut rng);
        for _ in 0..20 {
            let reading = advance(&model, &mut dev, &mut rng);
            assert_eq!(reading.moisture.to_bits(), first.moisture.to_bits());
            assert_eq!(reading.battery.to_bits(), first.battery.to_bits());
            assert_eq!(reading.temperature_c.to_bits(), first.temperature_c.to_bits());
        }
        assert_eq!(dev.moisture, 50.0);
        assert_eq!(dev.battery, 100.0);
    }

    #[test]
    fn test_battery_drain_and_pump_load() {
        let model = SimulationModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let config = DeviceConfig {
            battery_drain_per_hour: 3.6,
            ..Default::default()
        };

        let idle = device(config.clone());
        let idle_next = model.step(&idle, Utc::now(), 100.0, &mut rng).next;
        assert!((idle_next.battery - 99.9).abs() < 1e-9);

        let mut pumping = device(config);
        pumping.watering = true;
        let pumping_next = model.step(&pumping, Utc::now(), 100.0, &mut rng).next;
        assert!(pumping_next.battery < idle_next.battery);

        let mut empty = device(DeviceConfig::default());
        empty.battery = 0.0;
        assert_eq!(model.step(&empty, Utc::now(), 3600.0, &mut rng).next.battery, 0.0);
    }

    #[test]
    fn test_fault_spike_is_cosmetic() {
        let model = quiet_model();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut dev = device(DeviceConfig {
            noise: 0.0,
            evaporation_rate: 0.01,
            ..Default::default()
        });
        dev.status = DeviceStatus::Fault;

        let mut spiked = 0;
        for _ in 0..200 {
            let expected = dev.moisture - 0.01;
            let reading = advance(&model, &mut dev, &mut rng);
            assert!((dev.moisture - expected).abs() < 1e-9);
            assert!((reading.moisture - dev.moisture).abs() <= 4.0 + 0.01);
            if (reading.moisture - round2(dev.moisture)).abs() > 0.011 {
                spiked += 1;
            }
        }
        assert!(spiked > 0);
    }

    #[test]
    fn test_fault_spike_drift_policy() {
        let model = SimulationModel::new(&SimulationConfig {
            fault_policy: FaultPolicy::Drift,
            temperature_noise_c: 0.0,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut dev = device(DeviceConfig {
            noise: 0.0,
            evaporation_rate: 0.0,
            ..Default::default()
        });
        dev.status = DeviceStatus::Fault;

        for _ in 0..50 {
            advance(&model, &mut dev, &mut rng);
        }
        assert_ne!(dev.moisture, 50.0);
    }

    #[test]
    fn test_malformed_config_is_neutralised() {
        let model = quiet_model();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut dev = device(DeviceConfig {
            evaporation_rate: -3.0,
            leak_rate: f64::NAN,
            noise: f64::INFINITY,
            temp_mean_c: f64::NAN,
            battery_drain_per_hour: -1.0,
            ..Default::default()
        });

        let reading = advance(&model, &mut dev, &mut rng);
        assert_eq!(dev.moisture, 50.0);
        assert_eq!(dev.battery, 100.0);
        assert!(reading.temperature_c.is_finite());
    }

    #[test]
    fn test_deterministic_given_seed() {
        let model = SimulationModel::default();
        let mut dev = device(DeviceConfig::default());
        dev.status = DeviceStatus::Fault;
        let now = Utc::now();

        let a = model.step(&dev, now, 1.0, &mut ChaCha8Rng::seed_from_u64(99));
        let b = model.step(&dev, now, 1.0, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_heat_factor_range() {
        let cfg = DeviceConfig {
            temp_amp_c: 10.0,
            ..Default::default()
        };
        let noon = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        assert!((heat_factor(noon, &cfg) - MAX_HEAT_FACTOR).abs() < 1e-9);
        assert_eq!(heat_factor(midnight, &cfg), 0.0);
    }
}
