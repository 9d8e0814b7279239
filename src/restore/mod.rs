//! Start-up restoration of persisted block decisions.
//!
//! The procedure is one-shot: wait for the device store, pick an engine, check
//! privileges, then replay every blocked device through the engine.

pub mod repository;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineSelector, FirewallEngine, NullEngine};
use crate::error::NetblockError;

pub use repository::{
    DeviceRecord, DeviceRepository, DeviceStatus, InMemoryDeviceRepository, JsonDeviceRepository,
};

/// Default wait before the first repository read.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(2000);

/// Where the procedure is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestorationState {
    Idle,
    WaitingForStore,
    Selecting,
    Restoring,
    Done,
    Skipped,
    Failed,
}

impl RestorationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for RestorationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Summary of one restoration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestorationReport {
    pub state: RestorationState,
    pub restored: usize,
    pub total: usize,
}

impl RestorationReport {
    fn stopped(state: RestorationState) -> Self {
        Self {
            state,
            restored: 0,
            total: 0,
        }
    }
}

/// The report plus the engine the procedure selected, for later use.
pub struct RestorationOutcome {
    pub engine: Arc<dyn FirewallEngine>,
    pub report: RestorationReport,
}

/// Replays persisted block decisions into a freshly selected engine.
pub struct RestorationProcedure {
    selector: EngineSelector,
    repository: Arc<dyn DeviceRepository>,
    startup_delay: Duration,
    cancel: CancellationToken,
}

impl RestorationProcedure {
    pub fn new(selector: EngineSelector, repository: Arc<dyn DeviceRepository>) -> Self {
        Self {
            selector,
            repository,
            startup_delay: DEFAULT_STARTUP_DELAY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Use `cancel` to stop the procedure during the delay or between devices.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn enter(state: &mut RestorationState, next: RestorationState) {
        tracing::debug!("Restoration: {} -> {}", state, next);
        *state = next;
    }

    /// Run the procedure to a terminal state.
    pub async fn run(&self) -> RestorationOutcome {
        let mut state = RestorationState::Idle;

        Self::enter(&mut state, RestorationState::WaitingForStore);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::info!("Restoration cancelled before start");
                return self.finish(
                    Arc::new(NullEngine::default()),
                    state,
                    RestorationReport::stopped(RestorationState::Skipped),
                );
            }
            _ = tokio::time::sleep(self.startup_delay) => {}
        }

        Self::enter(&mut state, RestorationState::Selecting);
        let engine = match self.selector.select_engine() {
            Ok(engine) => engine,
            Err(NetblockError::UnsupportedPlatform(platform)) => {
                tracing::info!("No firewall engine for {}; nothing to restore", platform);
                return self.finish(
                    Arc::new(NullEngine::new(platform)),
                    state,
                    RestorationReport::stopped(RestorationState::Skipped),
                );
            }
            Err(e) => {
                tracing::error!("Engine selection failed: {}", e);
                return self.finish(
                    Arc::new(NullEngine::default()),
                    state,
                    RestorationReport::stopped(RestorationState::Failed),
                );
            }
        };

        Self::enter(&mut state, RestorationState::Restoring);
        if !engine.is_supported() {
            tracing::info!("{} is not supported here; skipping restore", engine.engine_name());
            return self.finish(engine, state, RestorationReport::stopped(RestorationState::Skipped));
        }

        if !engine.check_permissions().await {
            tracing::warn!(
                "Insufficient privileges for {}; blocked devices were not restored",
                engine.engine_name()
            );
            return self.finish(engine, state, RestorationReport::stopped(RestorationState::Skipped));
        }

        let devices = match self.repository.get_blocked_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!("Could not read blocked devices: {}", e);
                return self.finish(
                    engine,
                    state,
                    RestorationReport::stopped(RestorationState::Failed),
                );
            }
        };

        let restored = engine
            .restore_rules_from_database(&devices, &self.cancel)
            .await;
        let report = RestorationReport {
            state: RestorationState::Done,
            restored,
            total: devices.len(),
        };
        tracing::info!("Restored {}/{} blocked device(s)", restored, devices.len());
        self.finish(engine, state, report)
    }

    fn finish(
        &self,
        engine: Arc<dyn FirewallEngine>,
        mut state: RestorationState,
        report: RestorationReport,
    ) -> RestorationOutcome {
        Self::enter(&mut state, report.state);
        RestorationOutcome { engine, report }
    }

    /// Run in the background. A panic inside the procedure ends it as `Failed`
    /// instead of taking the caller down.
    pub fn spawn(self) -> JoinHandle<RestorationReport> {
        tokio::spawn(async move {
            let inner = tokio::spawn(async move { self.run().await.report });
            match inner.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Restoration task aborted: {}", e);
                    RestorationReport::stopped(RestorationState::Failed)
                }
            }
        })
    }
}
