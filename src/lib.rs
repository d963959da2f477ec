// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! MoistureSim - Soil-Moisture Device Telemetry Simulator
//!
//! The engine behind the plant-monitoring dashboard:
//! - A population of virtual soil-moisture sensors with watering actuators
//! - Evaporation, irrigation, leak, battery and diurnal temperature model
//! - Per-device hysteresis control loop for auto-mode watering
//! - Bounded per-device reading history
//! - Live reading batches fanned out to any number of subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MoistureSim Engine                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │   commands ──► ┌──────────────┐ ◄── commit ┌──────────────┐  │
//! │                │ Device Store │            │    Tick      │  │
//! │                │  + History   │ ─snapshot─►│  Scheduler   │  │
//! │                └──────────────┘            └──────┬───────┘  │
//! │                                          ┌────────┴───────┐  │
//! │                                          │ Simulation     │  │
//! │                                          │ Model + Control│  │
//! │                                          └────────┬───────┘  │
//! │                                                   ▼ batch    │
//! │                ┌──────────────┐            ┌──────────────┐  │
//! │   clients ◄─── │  WebSocket   │ ◄───────── │ Broadcast Hub│  │
//! │                └──────────────┘            └──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod devices;
pub mod simulation;
pub mod control;
pub mod streaming;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::{Config, SimulationConfig};
pub use self::core::{BroadcastHub, Engine, EngineHealth, ReadingBatch, Subscription, TickReport};
pub use devices::{
    Device, DeviceConfig, DeviceConfigPatch, DeviceCreate, DeviceStatus, DeviceUpdate, Reading,
};
pub use simulation::{FaultPolicy, SimulationModel};
pub use control::{ControlLoop, WateringDecision};
pub use streaming::WebSocketServer;
pub use error::{EngineError, EngineResult};

/// MoistureSim version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MoistureSim name
pub const NAME: &str = "MoistureSim";
