//! Optional security-log collaborator notified of rule changes.

use serde::Serialize;

/// Severity of a system event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Receiver of firewall audit events.
///
/// Engines hold this as an `Option`; when absent nothing is reported and no
/// operation is affected.
pub trait SecurityLog: Send + Sync {
    fn log_firewall_rule_added(&self, rule_name: &str, mac: &str, ip: Option<&str>);
    fn log_firewall_rule_removed(&self, rule_name: &str, mac: &str, ip: Option<&str>);
    fn log_system_event(&self, message: &str, severity: Severity);
}

/// Writes security events to the `netblock::security` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSecurityLog;

impl SecurityLog for TracingSecurityLog {
    fn log_firewall_rule_added(&self, rule_name: &str, mac: &str, ip: Option<&str>) {
        tracing::info!(
            target: "netblock::security",
            rule = rule_name,
            mac,
            ip = ip.unwrap_or("-"),
            "Firewall rule added"
        );
    }

    fn log_firewall_rule_removed(&self, rule_name: &str, mac: &str, ip: Option<&str>) {
        tracing::info!(
            target: "netblock::security",
            rule = rule_name,
            mac,
            ip = ip.unwrap_or("-"),
            "Firewall rule removed"
        );
    }

    fn log_system_event(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(target: "netblock::security", "{}", message),
            Severity::Warning => tracing::warn!(target: "netblock::security", "{}", message),
            Severity::Critical => tracing::error!(target: "netblock::security", "{}", message),
        }
    }
}
