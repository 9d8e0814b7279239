//! Engine for platforms without a packet-filter implementation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::result::{BlockResult, ErrorCode, FirewallRule};
use crate::engine::FirewallEngine;
use crate::restore::DeviceRecord;

/// Refuses every mutation and reports nothing blocked. Never runs a command.
#[derive(Debug, Clone)]
pub struct NullEngine {
    platform: String,
}

impl NullEngine {
    /// `platform` names the OS the engine stands in for, for messages.
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    fn unsupported(&self) -> BlockResult {
        BlockResult::fail(
            ErrorCode::UnsupportedPlatform,
            format!("Device blocking is not supported on {}", self.platform),
        )
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new(std::env::consts::OS)
    }
}

#[async_trait]
impl FirewallEngine for NullEngine {
    fn engine_name(&self) -> &'static str {
        "Null (unsupported platform)"
    }

    fn is_supported(&self) -> bool {
        false
    }

    async fn block_device(&self, _mac: &str, _ip: Option<&str>) -> BlockResult {
        self.unsupported()
    }

    async fn unblock_device(&self, _mac: &str, _ip: Option<&str>) -> BlockResult {
        self.unsupported()
    }

    fn is_device_blocked(&self, _mac: &str) -> bool {
        false
    }

    fn get_active_rules(&self) -> Vec<FirewallRule> {
        Vec::new()
    }

    async fn restore_rules_from_database(
        &self,
        devices: &[DeviceRecord],
        _cancel: &CancellationToken,
    ) -> usize {
        tracing::debug!(
            "Skipping restore of {} device(s): unsupported platform {}",
            devices.len(),
            self.platform
        );
        0
    }

    async fn clear_all_rules(&self) -> BlockResult {
        self.unsupported()
    }

    async fn check_permissions(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_mutation_is_unsupported() {
        let engine = NullEngine::new("plan9");
        assert!(!engine.is_supported());

        let block = engine.block_device("aa:bb:cc:dd:ee:ff", Some("10.0.0.1")).await;
        assert_eq!(block.error_code, ErrorCode::UnsupportedPlatform);
        assert!(block.message.contains("plan9"));

        let unblock = engine.unblock_device("aa:bb:cc:dd:ee:ff", None).await;
        assert_eq!(unblock.error_code, ErrorCode::UnsupportedPlatform);

        let clear = engine.clear_all_rules().await;
        assert_eq!(clear.error_code, ErrorCode::UnsupportedPlatform);

        let devices = vec![DeviceRecord::blocked("aa:bb:cc:dd:ee:ff", None)];
        assert_eq!(
            engine
                .restore_rules_from_database(&devices, &CancellationToken::new())
                .await,
            0
        );

        assert!(!engine.is_device_blocked("aa:bb:cc:dd:ee:ff"));
        assert!(engine.get_active_rules().is_empty());
        assert!(!engine.check_permissions().await);
    }
}
