//! Utility modules.

pub mod address;
pub mod debug;
pub mod interfaces;
pub mod platform;
pub mod shell;

pub use address::{compact_mac, normalize_mac, parse_optional_ip};
pub use debug::{init_debug_logging, is_debug_enabled, NETBLOCK_DEBUG_ENV};
pub use interfaces::local_mac_addresses;
pub use platform::{current_platform, is_wsl1, Platform};
pub use shell::{command_line, quote, split_args};
