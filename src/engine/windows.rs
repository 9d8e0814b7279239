//! Windows engine: named `netsh advfirewall` rules.
//!
//! Windows Firewall filters by address, not by MAC, so a device without an IP
//! is only recorded in the cache. Devices with an IP get an inbound and an
//! outbound rule named `<prefix><MAC>_In` / `_Out`.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::command::CommandRunner;
use crate::engine::context::{
    collect_failures, total_failure, DeviceTarget, EngineContext, EngineOptions, FilterCommand,
};
use crate::engine::result::{BlockResult, FirewallRule};
use crate::engine::FirewallEngine;
use crate::restore::DeviceRecord;
use crate::security_log::SecurityLog;
use crate::utils::Platform;

const ENGINE_NAME: &str = "Windows Firewall (netsh)";

const INBOUND_SUFFIX: &str = "_In";
const OUTBOUND_SUFFIX: &str = "_Out";

/// Windows Firewall engine.
pub struct WindowsEngine {
    ctx: EngineContext,
    supported: bool,
}

impl WindowsEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        options: EngineOptions,
        security_log: Option<Arc<dyn SecurityLog>>,
    ) -> Self {
        Self {
            ctx: EngineContext::new(runner, options, security_log),
            supported: Platform::detect() == Some(Platform::Windows),
        }
    }

    /// Override live-OS detection, e.g. when the selector was told the platform.
    pub fn with_supported(mut self, supported: bool) -> Self {
        self.supported = supported;
        self
    }

    fn netsh<I, S>(&self, label: &'static str, args: I) -> FilterCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterCommand::new(label, &self.ctx.options.netsh_command, args)
    }

    fn add_rule(&self, label: &'static str, name: &str, dir: &str, ip: IpAddr) -> FilterCommand {
        self.netsh(
            label,
            [
                "advfirewall".to_string(),
                "firewall".to_string(),
                "add".to_string(),
                "rule".to_string(),
                format!("name={}", name),
                format!("dir={}", dir),
                "action=block".to_string(),
                format!("remoteip={}", ip),
                "enable=yes".to_string(),
            ],
        )
    }

    fn delete_rule(&self, name: &str) -> FilterCommand {
        self.netsh(
            "delete rule",
            [
                "advfirewall".to_string(),
                "firewall".to_string(),
                "delete".to_string(),
                "rule".to_string(),
                format!("name={}", name),
            ],
        )
    }

    fn directional_names(rule_name: &str) -> [String; 2] {
        [
            format!("{}{}", rule_name, INBOUND_SUFFIX),
            format!("{}{}", rule_name, OUTBOUND_SUFFIX),
        ]
    }

    async fn block_locked(&self, mac: &str, ip: Option<&str>) -> BlockResult {
        let DeviceTarget { mac, ip } = match self.ctx.check_blockable(mac, ip) {
            Ok(target) => target,
            Err(result) => return result,
        };

        let rule_name = self.ctx.rule_name(&mac);

        let Some(addr) = ip else {
            self.ctx
                .record_block(FirewallRule::block(rule_name.clone(), mac.clone(), None));
            tracing::info!("Registered {} without an IP; no firewall rule created", mac);
            return BlockResult::ok(format!(
                "Device {} registered as blocked; Windows Firewall needs an IP address to enforce it",
                mac
            ));
        };

        let [inbound, outbound] = Self::directional_names(&rule_name);
        let commands = vec![
            self.add_rule("inbound rule", &inbound, "in", addr),
            self.add_rule("outbound rule", &outbound, "out", addr),
        ];
        let outputs = self.ctx.run_all(&commands).await;
        let failures = collect_failures(&commands, &outputs);

        if failures.len() == commands.len() {
            tracing::warn!("Failed to block {}: {}", mac, failures.join("; "));
            return total_failure(format!("Failed to block device {}", mac), &outputs, &failures);
        }

        self.ctx
            .record_block(FirewallRule::block(rule_name.clone(), mac.clone(), Some(addr)));
        tracing::info!("Blocked {} at {}", mac, addr);

        BlockResult::ok_with_details(
            format!("Device {} blocked ({})", mac, rule_name),
            (!failures.is_empty()).then(|| failures.join("; ")),
        )
    }

    async fn unblock_locked(&self, mac: &str, ip: Option<&str>) -> BlockResult {
        let target = match self.ctx.parse_target(mac, ip) {
            Ok(target) => target,
            Err(result) => return result,
        };

        let cached = self.ctx.cache.get(&target.mac);
        let ip = target.ip.or_else(|| cached.as_ref().and_then(|r| r.ip_address));
        let rule_name = cached
            .map(|r| r.rule_name)
            .unwrap_or_else(|| self.ctx.rule_name(&target.mac));

        let commands: Vec<FilterCommand> = Self::directional_names(&rule_name)
            .iter()
            .map(|name| self.delete_rule(name))
            .collect();
        let outputs = self.ctx.run_all(&commands).await;
        for failure in collect_failures(&commands, &outputs) {
            // "No rules match the specified criteria." is expected here
            tracing::debug!("Ignoring removal failure for {}: {}", target.mac, failure);
        }

        self.ctx.record_unblock(&rule_name, &target.mac, ip);
        tracing::info!("Unblocked {}", target.mac);

        BlockResult::ok(format!("Device {} unblocked", target.mac))
    }
}

#[async_trait]
impl FirewallEngine for WindowsEngine {
    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn block_device(&self, mac: &str, ip: Option<&str>) -> BlockResult {
        let _guard = self.ctx.lock.lock().await;
        self.block_locked(mac, ip).await
    }

    async fn unblock_device(&self, mac: &str, ip: Option<&str>) -> BlockResult {
        let _guard = self.ctx.lock.lock().await;
        self.unblock_locked(mac, ip).await
    }

    fn is_device_blocked(&self, mac: &str) -> bool {
        self.ctx.is_blocked(mac)
    }

    fn get_active_rules(&self) -> Vec<FirewallRule> {
        self.ctx.cache.snapshot()
    }

    async fn restore_rules_from_database(
        &self,
        devices: &[DeviceRecord],
        cancel: &CancellationToken,
    ) -> usize {
        self.ctx
            .restore_devices(ENGINE_NAME, devices, cancel, |device| {
                self.block_locked(&device.mac_address, device.ip_address.as_deref())
            })
            .await
    }

    async fn clear_all_rules(&self) -> BlockResult {
        let _guard = self.ctx.lock.lock().await;

        let rules = self.ctx.cache.drain();
        let mut deleted: HashSet<String> = HashSet::new();
        let mut failures = Vec::new();

        // Known rules by name first
        let targeted: Vec<FilterCommand> = rules
            .iter()
            .filter(|r| r.ip_address.is_some())
            .flat_map(|r| Self::directional_names(&r.rule_name))
            .inspect(|name| {
                deleted.insert(name.clone());
            })
            .map(|name| self.delete_rule(&name))
            .collect();
        let outputs = self.ctx.run_all(&targeted).await;
        failures.extend(collect_failures(&targeted, &outputs));

        // Then anything else carrying our prefix
        let list = self.netsh(
            "list rules",
            ["advfirewall", "firewall", "show", "rule", "name=all"],
        );
        let listing = self.ctx.runner.run(&list.program, &list.args).await;

        for rule in &rules {
            self.ctx
                .record_unblock(&rule.rule_name, &rule.mac_address, rule.ip_address);
        }

        if !listing.success {
            failures.push(format!("{}: {}", list.label, listing.error_text()));
            tracing::warn!("Failed to list firewall rules: {}", listing.error_text());
            return total_failure(
                "Failed to list firewall rules",
                std::slice::from_ref(&listing),
                &failures,
            );
        }

        let leftovers: Vec<FilterCommand> =
            parse_netsh_rule_names(&listing.stdout, &self.ctx.options.rule_prefix)
                .into_iter()
                .filter(|name| !deleted.contains(name))
                .map(|name| self.delete_rule(&name))
                .collect();
        let outputs = self.ctx.run_all(&leftovers).await;
        failures.extend(collect_failures(&leftovers, &outputs));

        tracing::info!(
            "Cleared {} cached rule(s) and {} discovered rule(s)",
            rules.len(),
            leftovers.len()
        );
        BlockResult::ok_with_details(
            format!("Cleared {} rule(s)", rules.len() + leftovers.len()),
            (!failures.is_empty()).then(|| failures.join("; ")),
        )
    }

    async fn check_permissions(&self) -> bool {
        let probe = self.netsh("permission probe", ["advfirewall", "show", "currentprofile"]);
        self.ctx.runner.run(&probe.program, &probe.args).await.success
    }
}

/// Rule names starting with `prefix` in a `netsh advfirewall firewall show rule` listing.
///
/// Matches any `Label:   value` line whose value starts with the prefix, so the
/// localized "Rule Name:" label does not matter.
fn parse_netsh_rule_names(listing: &str, prefix: &str) -> Vec<String> {
    let pattern = format!(
        r"(?m)^[^:\r\n]+:[ \t]+({}\S*)[ \t\r]*$",
        regex::escape(prefix)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Cannot build rule name pattern: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    re.captures_iter(listing)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
