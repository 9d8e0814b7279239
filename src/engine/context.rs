//! State and helpers shared by the platform engines.

use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandOutput, CommandRunner};
use crate::config::{NetblockConfig, DEFAULT_CHAIN_NAME, DEFAULT_RULE_PREFIX};
use crate::engine::cache::RuleCache;
use crate::engine::result::{rule_name_for, BlockResult, ErrorCode, FirewallRule};
use crate::restore::DeviceRecord;
use crate::security_log::{SecurityLog, Severity};
use crate::utils::{normalize_mac, parse_optional_ip};

/// stderr fragments that mean the caller lacks firewall privileges.
const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "you must be root",
    "requires elevation",
    "run as administrator",
    "access is denied",
];

/// Engine settings derived from [`NetblockConfig`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chain_name: String,
    pub rule_prefix: String,
    pub link_layer_blocking: bool,
    /// Canonical MACs that are never blocked.
    pub protected_macs: HashSet<String>,
    pub iptables_command: String,
    pub ebtables_command: String,
    pub netsh_command: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chain_name: DEFAULT_CHAIN_NAME.to_string(),
            rule_prefix: DEFAULT_RULE_PREFIX.to_string(),
            link_layer_blocking: true,
            protected_macs: HashSet::new(),
            iptables_command: "iptables".to_string(),
            ebtables_command: "ebtables".to_string(),
            netsh_command: "netsh".to_string(),
        }
    }
}

impl EngineOptions {
    /// Build options from configuration plus this host's interface MACs.
    pub fn from_config(config: &NetblockConfig, local_macs: &[String]) -> Self {
        let mut protected_macs: HashSet<String> =
            config.normalized_protected_macs().into_iter().collect();
        if config.protect_local_interfaces {
            protected_macs.extend(local_macs.iter().filter_map(|m| normalize_mac(m)));
        }

        Self {
            chain_name: config.chain_name.clone(),
            rule_prefix: config.rule_prefix.clone(),
            link_layer_blocking: config.link_layer_blocking,
            protected_macs,
            iptables_command: config.iptables_command.clone(),
            ebtables_command: config.ebtables_command.clone(),
            netsh_command: config.netsh_command.clone(),
        }
    }
}

/// One OS command an engine wants to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCommand {
    /// Short label used in diagnostics, e.g. "MAC rule".
    pub label: &'static str,
    pub program: String,
    pub args: Vec<String>,
}

impl FilterCommand {
    pub fn new<I, S>(label: &'static str, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validated block/unblock target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub mac: String,
    pub ip: Option<IpAddr>,
}

/// Per-instance engine state: runner, options, cache and the mutation lock.
pub struct EngineContext {
    pub runner: Arc<dyn CommandRunner>,
    pub options: EngineOptions,
    pub cache: RuleCache,
    /// Serializes block, unblock, clear and restore on this instance.
    pub lock: Mutex<()>,
    pub security_log: Option<Arc<dyn SecurityLog>>,
}

impl EngineContext {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        options: EngineOptions,
        security_log: Option<Arc<dyn SecurityLog>>,
    ) -> Self {
        Self {
            runner,
            options,
            cache: RuleCache::new(),
            lock: Mutex::new(()),
            security_log,
        }
    }

    pub fn rule_name(&self, canonical_mac: &str) -> String {
        rule_name_for(&self.options.rule_prefix, canonical_mac)
    }

    /// Normalize the MAC and parse the IP, rejecting bad input.
    pub fn parse_target(&self, mac: &str, ip: Option<&str>) -> Result<DeviceTarget, BlockResult> {
        let canonical = normalize_mac(mac).ok_or_else(|| {
            BlockResult::fail(
                ErrorCode::InvalidMacAddress,
                format!("Invalid MAC address: '{}'", mac),
            )
        })?;

        let ip = parse_optional_ip(ip).map_err(|raw| {
            BlockResult::fail(
                ErrorCode::InvalidIpAddress,
                format!("Invalid IP address: '{}'", raw),
            )
        })?;

        Ok(DeviceTarget { mac: canonical, ip })
    }

    /// Checks every block operation performs before touching the OS.
    pub fn check_blockable(
        &self,
        mac: &str,
        ip: Option<&str>,
    ) -> Result<DeviceTarget, BlockResult> {
        let target = self.parse_target(mac, ip)?;

        if self.options.protected_macs.contains(&target.mac) {
            tracing::warn!("Refusing to block protected device {}", target.mac);
            return Err(BlockResult::fail(
                ErrorCode::SelfBlockPrevented,
                format!("Device {} is protected and cannot be blocked", target.mac),
            ));
        }

        if self.cache.contains(&target.mac) {
            return Err(BlockResult::fail(
                ErrorCode::AlreadyBlocked,
                format!("Device {} is already blocked", target.mac),
            ));
        }

        Ok(target)
    }

    /// Cache lookup accepting any MAC spelling.
    pub fn is_blocked(&self, mac: &str) -> bool {
        normalize_mac(mac)
            .map(|m| self.cache.contains(&m))
            .unwrap_or(false)
    }

    /// Re-block every device marked blocked, holding the mutation lock throughout.
    ///
    /// `block` is the engine's block routine that expects the lock to be held.
    /// Stops between devices once `cancel` fires.
    pub async fn restore_devices<'a, F, Fut>(
        &self,
        engine_name: &str,
        devices: &'a [DeviceRecord],
        cancel: &CancellationToken,
        mut block: F,
    ) -> usize
    where
        F: FnMut(&'a DeviceRecord) -> Fut,
        Fut: Future<Output = BlockResult>,
    {
        let _guard = self.lock.lock().await;

        let mut attempted = 0;
        let mut restored = 0;
        for device in blocked_devices(devices) {
            if cancel.is_cancelled() {
                tracing::info!("Restore cancelled after {} device(s)", attempted);
                break;
            }

            attempted += 1;
            let was_cached = self.is_blocked(&device.mac_address);
            let result = block(device).await;
            // Rules found in the firewall were adopted into the cache
            let adopted = !was_cached && result.error_code == ErrorCode::AlreadyBlocked;
            if result.success || adopted {
                restored += 1;
            } else {
                tracing::warn!(
                    "Could not restore block for {}: {}",
                    device.mac_address,
                    result.message
                );
            }
        }

        self.report_restored(engine_name, restored, attempted);
        restored
    }

    /// Run commands one after another, returning each output in order.
    pub async fn run_all(&self, commands: &[FilterCommand]) -> Vec<CommandOutput> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.runner.run(&command.program, &command.args).await);
        }
        outputs
    }

    /// Record a newly enforced rule and notify the security log.
    pub fn record_block(&self, rule: FirewallRule) {
        if let Some(log) = &self.security_log {
            log.log_firewall_rule_added(
                &rule.rule_name,
                &rule.mac_address,
                rule.ip_string().as_deref(),
            );
        }
        self.cache.insert(rule);
    }

    /// Drop a rule from the cache and notify the security log.
    pub fn record_unblock(&self, rule_name: &str, mac: &str, ip: Option<IpAddr>) {
        self.cache.remove(mac);
        if let Some(log) = &self.security_log {
            log.log_firewall_rule_removed(rule_name, mac, ip.map(|i| i.to_string()).as_deref());
        }
    }

    /// Report the aggregate outcome of a restore run.
    pub fn report_restored(&self, engine_name: &str, restored: usize, attempted: usize) {
        tracing::info!(
            "{}: restored {} of {} blocked device(s)",
            engine_name,
            restored,
            attempted
        );
        if restored > 0 {
            if let Some(log) = &self.security_log {
                log.log_system_event(
                    &format!(
                        "Restored {} firewall block rule(s) from the device database",
                        restored
                    ),
                    Severity::Info,
                );
            }
        }
    }
}

/// Devices that restoration should re-block.
pub fn blocked_devices(devices: &[DeviceRecord]) -> impl Iterator<Item = &DeviceRecord> {
    devices.iter().filter(|d| d.is_marked_blocked())
}

/// Pair every failed command with its error text, formatted for `error_details`.
pub fn collect_failures(commands: &[FilterCommand], outputs: &[CommandOutput]) -> Vec<String> {
    commands
        .iter()
        .zip(outputs)
        .filter(|(_, out)| !out.success)
        .map(|(cmd, out)| format!("{}: {}", cmd.label, out.error_text()))
        .collect()
}

/// True if stderr indicates missing privileges.
pub fn is_permission_error(output: &CommandOutput) -> bool {
    let text = output.error_text().to_lowercase();
    PERMISSION_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Result for a command set where nothing succeeded.
pub fn total_failure(
    message: impl Into<String>,
    outputs: &[CommandOutput],
    failures: &[String],
) -> BlockResult {
    let code = if !outputs.is_empty() && outputs.iter().all(is_permission_error) {
        ErrorCode::PermissionDenied
    } else {
        ErrorCode::CommandFailed
    };
    BlockResult::fail_with_details(code, message, failures.join("; "))
}
