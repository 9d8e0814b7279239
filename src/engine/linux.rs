//! Linux engine: iptables custom chains plus ebtables link-layer rules.
//!
//! Layout, for chain name `C`:
//! - `C` is jumped to from INPUT and FORWARD and holds the MAC and source-IP rules
//! - `C_OUT` is jumped to from OUTPUT and holds the destination-IP rule
//!   (the `mac` match is rejected in OUTPUT, so it cannot share a chain with it)
//! - the ebtables FORWARD chain holds a DROP for the source MAC
//!
//! Every iptables rule carries the deterministic rule name as a comment.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::CommandRunner;
use crate::engine::context::{
    collect_failures, total_failure, DeviceTarget, EngineContext, EngineOptions, FilterCommand,
};
use crate::engine::result::{BlockResult, ErrorCode, FirewallRule};
use crate::engine::FirewallEngine;
use crate::restore::DeviceRecord;
use crate::security_log::SecurityLog;
use crate::utils::{is_wsl1, split_args, Platform};

const ENGINE_NAME: &str = "Linux iptables/ebtables";

/// Built-in chains the inbound chain is linked into.
const INBOUND_PARENTS: &[&str] = &["INPUT", "FORWARD"];

/// Built-in chains the outbound chain is linked into.
const OUTBOUND_PARENTS: &[&str] = &["OUTPUT"];

/// ebtables chain carrying link-layer drops.
const EBTABLES_CHAIN: &str = "FORWARD";

const LINK_LAYER_RULE: &str = "link-layer rule";

/// Linux packet-filter engine.
pub struct LinuxEngine {
    ctx: EngineContext,
    chain_ready: AtomicBool,
    supported: bool,
}

impl LinuxEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        options: EngineOptions,
        security_log: Option<Arc<dyn SecurityLog>>,
    ) -> Self {
        Self {
            ctx: EngineContext::new(runner, options, security_log),
            chain_ready: AtomicBool::new(false),
            supported: Platform::detect() == Some(Platform::Linux) && !is_wsl1(),
        }
    }

    /// Override live-OS detection, e.g. when the selector was told the platform.
    pub fn with_supported(mut self, supported: bool) -> Self {
        self.supported = supported;
        self
    }

    fn inbound_chain(&self) -> &str {
        &self.ctx.options.chain_name
    }

    fn outbound_chain(&self) -> String {
        format!("{}_OUT", self.ctx.options.chain_name)
    }

    fn iptables<I, S>(&self, label: &'static str, args: I) -> FilterCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec!["-w".to_string()];
        full.extend(args.into_iter().map(Into::into));
        FilterCommand::new(label, &self.ctx.options.iptables_command, full)
    }

    fn ebtables<I, S>(&self, label: &'static str, args: I) -> FilterCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterCommand::new(label, &self.ctx.options.ebtables_command, args)
    }

    /// Create both custom chains and link them into the built-in chains.
    ///
    /// Runs once per instance; a failed attempt is retried on the next call.
    async fn ensure_chain_exists(&self) -> bool {
        if self.chain_ready.load(Ordering::SeqCst) {
            return true;
        }

        let outbound = self.outbound_chain();
        let layout: [(&str, &[&str]); 2] = [
            (self.inbound_chain(), INBOUND_PARENTS),
            (outbound.as_str(), OUTBOUND_PARENTS),
        ];

        let mut ready = true;
        for (chain, parents) in layout {
            let create = self.iptables("create chain", ["-N", chain]);
            let out = self.ctx.runner.run(&create.program, &create.args).await;
            if !out.success && !out.error_text().to_lowercase().contains("exists") {
                tracing::warn!("Failed to create chain {}: {}", chain, out.error_text());
                ready = false;
                continue;
            }

            for parent in parents {
                let check = self.iptables("check jump", ["-C", *parent, "-j", chain]);
                if self.ctx.runner.run(&check.program, &check.args).await.success {
                    continue;
                }

                let link = self.iptables("link chain", ["-I", *parent, "1", "-j", chain]);
                let out = self.ctx.runner.run(&link.program, &link.args).await;
                if !out.success {
                    tracing::warn!(
                        "Failed to link chain {} into {}: {}",
                        chain,
                        parent,
                        out.error_text()
                    );
                    ready = false;
                }
            }
        }

        if ready {
            tracing::debug!("Chains {} and {} are in place", self.inbound_chain(), outbound);
            self.chain_ready.store(true, Ordering::SeqCst);
        }
        ready
    }

    /// The per-device rule set. `op` is `-A` to add or `-D` to delete.
    fn device_commands(
        &self,
        op: &str,
        mac: &str,
        ip: Option<IpAddr>,
        rule_name: &str,
    ) -> Vec<FilterCommand> {
        let inbound = self.inbound_chain();
        let tag = ["-m", "comment", "--comment", rule_name, "-j", "DROP"];

        let mut commands = vec![self.iptables(
            "MAC rule",
            [op, inbound, "-m", "mac", "--mac-source", mac]
                .into_iter()
                .chain(tag),
        )];

        // iptables only handles IPv4; IPv6 devices are covered by the MAC rules
        if let Some(IpAddr::V4(addr)) = ip {
            let addr = addr.to_string();
            let outbound = self.outbound_chain();
            commands.push(self.iptables(
                "source IP rule",
                [op, inbound, "-s", addr.as_str()].into_iter().chain(tag),
            ));
            commands.push(self.iptables(
                "destination IP rule",
                [op, outbound.as_str(), "-d", addr.as_str()]
                    .into_iter()
                    .chain(tag),
            ));
        }

        if self.ctx.options.link_layer_blocking {
            commands.push(self.ebtables(
                LINK_LAYER_RULE,
                [op, EBTABLES_CHAIN, "-s", mac, "-j", "DROP"],
            ));
        }

        commands
    }

    /// `-A` rules currently in both custom chains, from `iptables -S`.
    async fn listed_chain_rules(&self) -> Vec<Vec<String>> {
        let outbound = self.outbound_chain();
        let mut rules = Vec::new();
        for chain in [self.inbound_chain(), outbound.as_str()] {
            let list = self.iptables("list chain", ["-S", chain]);
            let out = self.ctx.runner.run(&list.program, &list.args).await;
            if out.success {
                rules.extend(parse_iptables_rules(&out.stdout, chain));
            } else {
                tracing::debug!("Could not list chain {}: {}", chain, out.error_text());
            }
        }
        rules
    }

    /// Delete arguments for every listed link-layer drop of `mac`.
    async fn listed_link_layer_drops(&self, mac: &str) -> Vec<Vec<String>> {
        if !self.ctx.options.link_layer_blocking {
            return Vec::new();
        }

        let list = self.ebtables("list link-layer rules", ["-L", EBTABLES_CHAIN, "--Lx"]);
        let out = self.ctx.runner.run(&list.program, &list.args).await;
        if !out.success {
            tracing::debug!("Could not list {}: {}", EBTABLES_CHAIN, out.error_text());
            return Vec::new();
        }

        parse_ebtables_mac_drops(&out.stdout, EBTABLES_CHAIN)
            .into_iter()
            .filter(|args| {
                args.iter()
                    .position(|a| a == "-s")
                    .and_then(|i| args.get(i + 1))
                    .is_some_and(|listed| same_mac(listed, mac))
            })
            .collect()
    }

    async fn block_locked(&self, mac: &str, ip: Option<&str>) -> BlockResult {
        let DeviceTarget { mac, ip } = match self.ctx.check_blockable(mac, ip) {
            Ok(target) => target,
            Err(result) => return result,
        };

        if !self.ensure_chain_exists().await {
            tracing::warn!("Chain setup incomplete; attempting to block {} anyway", mac);
        }

        let rule_name = self.ctx.rule_name(&mac);
        let commands = self.device_commands("-A", &mac, ip, &rule_name);

        // Skip rules the firewall already holds so repeated blocks never stack duplicates
        let listed = self.listed_chain_rules().await;
        let link_layer_present = !self.listed_link_layer_drops(&mac).await.is_empty();
        let (present, pending): (Vec<FilterCommand>, Vec<FilterCommand>) =
            commands.into_iter().partition(|cmd| {
                if cmd.label == LINK_LAYER_RULE {
                    link_layer_present
                } else {
                    listed.iter().any(|rule| rule.as_slice() == &cmd.args[1..])
                }
            });

        if pending.is_empty() {
            tracing::info!("{} is already blocked in the firewall; adopting its rules", mac);
            self.ctx
                .cache
                .insert(FirewallRule::block(rule_name, mac.clone(), ip));
            return BlockResult::fail(
                ErrorCode::AlreadyBlocked,
                format!("Device {} is already blocked in the firewall", mac),
            );
        }

        let outputs = self.ctx.run_all(&pending).await;
        let failures = collect_failures(&pending, &outputs);

        if present.is_empty() && failures.len() == pending.len() {
            tracing::warn!("Failed to block {}: {}", mac, failures.join("; "));
            return total_failure(format!("Failed to block device {}", mac), &outputs, &failures);
        }

        let applied = present.len() + pending.len() - failures.len();
        let total = present.len() + pending.len();
        let mut details = failures;
        if matches!(ip, Some(IpAddr::V6(_))) {
            details.push("IPv6 address not enforced by iptables; MAC rules only".to_string());
        }

        self.ctx
            .record_block(FirewallRule::block(rule_name.clone(), mac.clone(), ip));
        tracing::info!("Blocked {} ({} of {} rules in place)", mac, applied, total);

        BlockResult::ok_with_details(
            format!("Device {} blocked ({})", mac, rule_name),
            (!details.is_empty()).then(|| details.join("; ")),
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

        let commands = self.device_commands("-D", &target.mac, ip, &rule_name);
        let outputs = self.ctx.run_all(&commands).await;
        for failure in collect_failures(&commands, &outputs) {
            tracing::debug!("Ignoring removal failure for {}: {}", target.mac, failure);
        }

        // Whatever is still listed under the rule name, e.g. IP rules for an
        // address this instance never saw
        let mut leftovers: Vec<FilterCommand> = self
            .listed_chain_rules()
            .await
            .into_iter()
            .filter(|rule| rule_comment(rule) == Some(rule_name.as_str()))
            .map(|mut rule| {
                rule[0] = "-D".to_string();
                self.iptables("listed rule", rule)
            })
            .collect();
        leftovers.extend(
            self.listed_link_layer_drops(&target.mac)
                .await
                .into_iter()
                .map(|args| self.ebtables("listed link-layer rule", args)),
        );
        if !leftovers.is_empty() {
            let outputs = self.ctx.run_all(&leftovers).await;
            for failure in collect_failures(&leftovers, &outputs) {
                tracing::warn!("Could not remove rule for {}: {}", target.mac, failure);
            }
            tracing::debug!("Removed {} listed rule(s) for {}", leftovers.len(), target.mac);
        }

        self.ctx.record_unblock(&rule_name, &target.mac, ip);
        tracing::info!("Unblocked {}", target.mac);

        BlockResult::ok(format!("Device {} unblocked", target.mac))
    }

    /// Remove leftover link-layer drops discovered by listing the ebtables chain.
    async fn clear_link_layer_rules(&self) -> Vec<String> {
        let list = self.ebtables("list link-layer rules", ["-L", EBTABLES_CHAIN, "--Lx"]);
        let out = self.ctx.runner.run(&list.program, &list.args).await;
        if !out.success {
            return vec![format!("{}: {}", list.label, out.error_text())];
        }

        let deletes: Vec<FilterCommand> = parse_ebtables_mac_drops(&out.stdout, EBTABLES_CHAIN)
            .into_iter()
            .map(|args| self.ebtables("delete link-layer rule", args))
            .collect();
        let outputs = self.ctx.run_all(&deletes).await;
        collect_failures(&deletes, &outputs)
    }
}

#[async_trait]
impl FirewallEngine for LinuxEngine {
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

        let outbound = self.outbound_chain();
        let flushes = vec![
            self.iptables("flush chain", ["-F", self.inbound_chain()]),
            self.iptables("flush outbound chain", ["-F", outbound.as_str()]),
        ];
        let flush_outputs = self.ctx.run_all(&flushes).await;
        let flush_failures = collect_failures(&flushes, &flush_outputs);

        let rules = self.ctx.cache.drain();
        let mut failures = flush_failures.clone();

        if self.ctx.options.link_layer_blocking {
            // Known rules first, by their deterministic form
            let targeted: Vec<FilterCommand> = rules
                .iter()
                .map(|r| {
                    self.ebtables(
                        "link-layer rule",
                        ["-D", EBTABLES_CHAIN, "-s", r.mac_address.as_str(), "-j", "DROP"],
                    )
                })
                .collect();
            let outputs = self.ctx.run_all(&targeted).await;
            failures.extend(collect_failures(&targeted, &outputs));

            failures.extend(self.clear_link_layer_rules().await);
        }

        for rule in &rules {
            self.ctx
                .record_unblock(&rule.rule_name, &rule.mac_address, rule.ip_address);
        }

        if flush_failures.len() == flushes.len() {
            tracing::warn!("Failed to flush chains: {}", flush_failures.join("; "));
            return total_failure("Failed to clear firewall rules", &flush_outputs, &failures);
        }

        tracing::info!("Cleared {} cached rule(s)", rules.len());
        BlockResult::ok_with_details(
            format!("Cleared {} rule(s)", rules.len()),
            (!failures.is_empty()).then(|| failures.join("; ")),
        )
    }

    async fn check_permissions(&self) -> bool {
        let probe = self.iptables("permission probe", ["-L", "INPUT", "-n"]);
        self.ctx.runner.run(&probe.program, &probe.args).await.success
    }
}

/// Extract delete arguments for every `-A <chain> -s <mac> -j DROP` line of an
/// `ebtables -L --Lx` listing.
fn parse_ebtables_mac_drops(listing: &str, chain: &str) -> Vec<Vec<String>> {
    listing
        .lines()
        .filter_map(|line| split_args(line.trim()).ok())
        .filter_map(|tokens| {
            let pos = tokens.iter().position(|t| t == "-A")?;
            let rule = &tokens[pos..];
            let is_mac_drop = rule.len() == 6
                && rule[1] == chain
                && rule[2] == "-s"
                && looks_like_listed_mac(&rule[3])
                && rule[4] == "-j"
                && rule[5] == "DROP";
            if !is_mac_drop {
                return None;
            }

            // Keep any leading table selection, skip the program name
            let start = usize::from(tokens.first().map(|t| t == "ebtables").unwrap_or(false));
            let mut args: Vec<String> = tokens[start..].to_vec();
            args[pos - start] = "-D".to_string();
            Some(args)
        })
        .collect()
}

/// Tokenized `-A <chain> ...` lines of an `iptables -S <chain>` listing.
///
/// Host addresses lose their `/32` suffix so they compare equal to the rules
/// this engine issues.
fn parse_iptables_rules(listing: &str, chain: &str) -> Vec<Vec<String>> {
    listing
        .lines()
        .filter_map(|line| split_args(line.trim()).ok())
        .filter(|tokens| tokens.len() > 2 && tokens[0] == "-A" && tokens[1] == chain)
        .map(|mut tokens| {
            for i in 1..tokens.len() {
                if tokens[i - 1] == "-s" || tokens[i - 1] == "-d" {
                    if let Some(host) = tokens[i].strip_suffix("/32") {
                        tokens[i] = host.to_string();
                    }
                }
            }
            tokens
        })
        .collect()
}

/// The `--comment` value of a listed rule.
fn rule_comment(tokens: &[String]) -> Option<&str> {
    let pos = tokens.iter().position(|t| t == "--comment")?;
    tokens.get(pos + 1).map(String::as_str)
}

/// Compare MACs octet by octet, so `0:11:22:33:44:5` equals `00:11:22:33:44:05`.
fn same_mac(a: &str, b: &str) -> bool {
    let octets = |mac: &str| {
        mac.split(':')
            .map(|part| u8::from_str_radix(part, 16).ok())
            .collect::<Option<Vec<u8>>>()
    };
    matches!((octets(a), octets(b)), (Some(x), Some(y)) if x.len() == 6 && x == y)
}

/// ebtables may print octets without leading zeros, e.g. `0:11:22:33:44:5`.
fn looks_like_listed_mac(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| (1..=2).contains(&p.len()) && p.chars().all(|c| c.is_ascii_hexdigit()))
}
