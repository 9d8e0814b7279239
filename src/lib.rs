//! netblock - per-device network blocking through the OS packet filter.
//!
//! Block decisions are keyed by MAC address and enforced with:
//! - Linux: iptables in a dedicated chain, plus ebtables for bridged traffic
//! - Windows: named Windows Firewall rules via netsh
//!
//! Other platforms get a null engine that refuses every mutation.

pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod restore;
pub mod security_log;
pub mod utils;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::NetblockConfig;
pub use engine::{
    BlockResult, EngineOptions, EngineSelector, ErrorCode, FirewallEngine, FirewallRule,
    LinuxEngine, NullEngine, WindowsEngine,
};
pub use error::{ConfigError, NetblockError, Result};
pub use restore::{
    DeviceRecord, DeviceRepository, RestorationProcedure, RestorationReport, RestorationState,
};
pub use security_log::{SecurityLog, Severity, TracingSecurityLog};

/// Re-export commonly used items.
pub mod prelude {
    pub use crate::config::NetblockConfig;
    pub use crate::engine::{BlockResult, EngineSelector, ErrorCode, FirewallEngine};
    pub use crate::error::{NetblockError, Result};
    pub use crate::restore::{DeviceRecord, DeviceRepository, RestorationProcedure};
}
