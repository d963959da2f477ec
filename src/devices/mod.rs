//! Device module - device records, readings and history

mod types;
mod history;
mod store;

pub use types::{
    Device, DeviceConfig, DeviceConfigPatch, DeviceCreate, DeviceStatus, DeviceUpdate,
    PhysicalState, Reading,
};
pub use history::HistoryBuffer;
pub use store::{DeviceStore, TickCommit};
