//! Reference-counted registry of imported buffer handles
//!
//! A record moves through `absent -> registered-unmapped <-> registered-mapped
//! -> absent`. Regions stay mapped until the release that drops the last
//! reference; there is no client-driven unmap.

pub mod config;
pub mod manager;
pub mod record;
pub mod stats;
pub mod table;
pub mod validator;

pub use config::RegistryConfig;
pub use manager::BufferRegistry;
pub use record::{BufferRecord, RecordInfo};
pub use stats::{RegistryStats, RegistryStatsSnapshot};
pub use table::RegistryTable;
pub use validator::validate_locked;
