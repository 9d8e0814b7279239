//! Engine selection by platform.

use std::sync::Arc;

use crate::command::CommandRunner;
use crate::engine::context::EngineOptions;
use crate::engine::{FirewallEngine, LinuxEngine, NullEngine, WindowsEngine};
use crate::error::{NetblockError, Result};
use crate::security_log::SecurityLog;
use crate::utils::{is_wsl1, Platform};

/// Where the selector gets the platform from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlatformSource {
    /// Ask the OS on every selection.
    Detect,
    /// Use a fixed answer; `None` means "unrecognised platform".
    Fixed(Option<Platform>),
}

/// Builds the engine matching the running platform.
pub struct EngineSelector {
    runner: Arc<dyn CommandRunner>,
    options: EngineOptions,
    security_log: Option<Arc<dyn SecurityLog>>,
    source: PlatformSource,
}

impl EngineSelector {
    pub fn new(runner: Arc<dyn CommandRunner>, options: EngineOptions) -> Self {
        Self {
            runner,
            options,
            security_log: None,
            source: PlatformSource::Detect,
        }
    }

    /// Attach a security log to every engine this selector builds.
    pub fn with_security_log(mut self, log: Arc<dyn SecurityLog>) -> Self {
        self.security_log = Some(log);
        self
    }

    /// Pretend to run on `platform` instead of detecting it.
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.source = PlatformSource::Fixed(platform);
        self
    }

    fn platform(&self) -> Result<Platform> {
        match self.source {
            PlatformSource::Detect => {
                let platform = Platform::detect().ok_or_else(|| {
                    NetblockError::UnsupportedPlatform(std::env::consts::OS.to_string())
                })?;
                if platform == Platform::Linux && is_wsl1() {
                    return Err(NetblockError::UnsupportedPlatform(
                        "WSL1 (no netfilter support)".to_string(),
                    ));
                }
                Ok(platform)
            }
            PlatformSource::Fixed(platform) => platform
                .ok_or_else(|| NetblockError::UnsupportedPlatform("unknown".to_string())),
        }
    }

    /// Build the engine for the current platform.
    pub fn select_engine(&self) -> Result<Arc<dyn FirewallEngine>> {
        let engine: Arc<dyn FirewallEngine> = match self.platform()? {
            Platform::Linux => Arc::new(
                LinuxEngine::new(
                    self.runner.clone(),
                    self.options.clone(),
                    self.security_log.clone(),
                )
                .with_supported(true),
            ),
            Platform::Windows => Arc::new(
                WindowsEngine::new(
                    self.runner.clone(),
                    self.options.clone(),
                    self.security_log.clone(),
                )
                .with_supported(true),
            ),
            other => return Err(NetblockError::UnsupportedPlatform(other.name().to_string())),
        };

        tracing::debug!("Selected engine: {}", engine.engine_name());
        Ok(engine)
    }

    /// Build the engine for the current platform, or a [`NullEngine`] if there is none.
    pub fn select_or_null(&self) -> Arc<dyn FirewallEngine> {
        match self.select_engine() {
            Ok(engine) => engine,
            Err(NetblockError::UnsupportedPlatform(platform)) => {
                tracing::warn!("No firewall engine for {}; blocking disabled", platform);
                Arc::new(NullEngine::new(platform))
            }
            Err(e) => {
                tracing::warn!("Engine selection failed: {}; blocking disabled", e);
                Arc::new(NullEngine::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::engine::ErrorCode;

    fn selector(runner: &Arc<ScriptedRunner>, platform: Option<Platform>) -> EngineSelector {
        EngineSelector::new(runner.clone(), EngineOptions::default()).with_platform(platform)
    }

    #[test]
    fn test_selects_engine_per_platform() {
        let runner = Arc::new(ScriptedRunner::new());

        let linux = selector(&runner, Some(Platform::Linux)).select_engine().unwrap();
        assert_eq!(linux.engine_name(), "Linux iptables/ebtables");
        assert!(linux.is_supported());

        let windows = selector(&runner, Some(Platform::Windows)).select_engine().unwrap();
        assert_eq!(windows.engine_name(), "Windows Firewall (netsh)");
        assert!(windows.is_supported());
    }

    #[test]
    fn test_unsupported_platforms_fail_explicitly() {
        let runner = Arc::new(ScriptedRunner::new());

        assert!(matches!(
            selector(&runner, Some(Platform::MacOS)).select_engine(),
            Err(NetblockError::UnsupportedPlatform(p)) if p == "macOS"
        ));
        assert!(matches!(
            selector(&runner, None).select_engine(),
            Err(NetblockError::UnsupportedPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_null_substitute_never_runs_commands() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = selector(&runner, Some(Platform::MacOS)).select_or_null();
        assert!(!engine.is_supported());

        let results = [
            engine.block_device("aa:bb:cc:dd:ee:ff", Some("10.0.0.1")).await,
            engine.unblock_device("aa:bb:cc:dd:ee:ff", Some("10.0.0.1")).await,
            engine.clear_all_rules().await,
        ];
        for result in results {
            assert!(!result.success);
            assert_eq!(result.error_code, ErrorCode::UnsupportedPlatform);
        }
        assert!(!engine.check_permissions().await);
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_engines_do_not_share_state() {
        let runner = Arc::new(ScriptedRunner::new());
        let selector = selector(&runner, Some(Platform::Linux));

        let first = selector.select_engine().unwrap();
        let second = selector.select_engine().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            assert!(first.block_device("aa:bb:cc:dd:ee:ff", None).await.success);
        });

        assert!(first.is_device_blocked("aa:bb:cc:dd:ee:ff"));
        assert!(!second.is_device_blocked("aa:bb:cc:dd:ee:ff"));
    }
}
