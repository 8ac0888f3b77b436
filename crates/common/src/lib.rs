//! Shared vocabulary for crossframe: object and thread ids, per-frame tick
//! context, and configuration.

pub mod clock;
pub mod config;
mod types;

pub use clock::{FrameClock, TickContext};
pub use config::{ConfigError, EngineConfig, MirrorConfig};
pub use types::{InstanceId, InstanceIdAllocator, ThreadId};
