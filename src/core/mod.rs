//! Core engine module - orchestrates the store, scheduler and broadcast hub

mod engine;
mod scheduler;
mod hub;

pub use engine::Engine;
pub use scheduler::{Scheduler, SchedulerState, TickReport};
pub use hub::{BroadcastHub, ReadingBatch, Subscription};

use serde::{Deserialize, Serialize};

/// Engine liveness summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub running: bool,
    pub tick_count: u64,
    pub devices: usize,
    pub subscribers: usize,
    pub tick_seconds: f64,
    pub uptime_seconds: u64,
}
