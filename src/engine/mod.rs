//! Device blocking engines.
//!
//! An engine turns "block this MAC" intents into OS packet-filter commands and
//! keeps an index of what it applied:
//! - Linux: iptables custom chain + ebtables link-layer rules
//! - Windows: named `netsh advfirewall` rules
//! - everything else: [`NullEngine`], which refuses every mutation

pub mod cache;
pub mod context;
pub mod linux;
pub mod null;
pub mod result;
pub mod selector;
pub mod windows;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::restore::DeviceRecord;

pub use self::cache::RuleCache;
pub use self::context::{EngineOptions, FilterCommand};
pub use self::linux::LinuxEngine;
pub use self::null::NullEngine;
pub use self::result::{BlockResult, ErrorCode, FirewallRule, RuleAction, RuleDirection};
pub use self::selector::EngineSelector;
pub use self::windows::WindowsEngine;

/// Enforcement contract shared by every platform engine.
///
/// Mutating operations are serialized per instance and report outcomes as
/// [`BlockResult`] values. Queries only consult the in-memory rule cache.
#[async_trait]
pub trait FirewallEngine: Send + Sync {
    /// Human-readable engine name for diagnostics.
    fn engine_name(&self) -> &'static str;

    /// True only for the engine matching the live OS.
    fn is_supported(&self) -> bool;

    /// Block a device by MAC, optionally also by IP.
    async fn block_device(&self, mac: &str, ip: Option<&str>) -> BlockResult;

    /// Remove every rule for a device, whether or not this instance created it.
    async fn unblock_device(&self, mac: &str, ip: Option<&str>) -> BlockResult;

    fn is_device_blocked(&self, mac: &str) -> bool;

    fn get_active_rules(&self) -> Vec<FirewallRule>;

    /// Re-block every device marked blocked. Returns how many were blocked.
    ///
    /// Stops between devices once `cancel` fires.
    async fn restore_rules_from_database(
        &self,
        devices: &[DeviceRecord],
        cancel: &CancellationToken,
    ) -> usize;

    /// Remove all rules this engine knows about or can discover.
    async fn clear_all_rules(&self) -> BlockResult;

    /// Side-effect-free probe for firewall management privileges.
    async fn check_permissions(&self) -> bool;
}
