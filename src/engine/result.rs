//! Outcome and rule types shared by every engine.

use std::net::IpAddr;
use std::time::SystemTime;

use serde::Serialize;

/// Closed set of reasons an engine operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    None,
    Unknown,
    PermissionDenied,
    DeviceNotFound,
    AlreadyBlocked,
    NotBlocked,
    InvalidMacAddress,
    InvalidIpAddress,
    CommandFailed,
    UnsupportedPlatform,
    SelfBlockPrevented,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Result of an engine operation.
///
/// Every expected failure comes back as one of these rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub error_code: ErrorCode,
}

impl BlockResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_details: None,
            error_code: ErrorCode::None,
        }
    }

    /// A success that still carries diagnostics, e.g. partially failed command sets.
    pub fn ok_with_details(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error_details: details,
            ..Self::ok(message)
        }
    }

    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_details: None,
            error_code: code,
        }
    }

    pub fn fail_with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error_details: Some(details.into()),
            ..Self::fail(code, message)
        }
    }
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleDirection {
    Inbound,
    Outbound,
    Both,
}

/// What a rule does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleAction {
    Block,
    Allow,
}

/// One enforced block decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    /// Deterministic name derived from the MAC, see [`rule_name_for`].
    pub rule_name: String,
    /// Canonical MAC (uppercase, colon-separated).
    pub mac_address: String,
    pub ip_address: Option<IpAddr>,
    pub created_at: SystemTime,
    pub direction: RuleDirection,
    pub action: RuleAction,
}

impl FirewallRule {
    /// A block rule covering both directions, created now.
    pub fn block(rule_name: String, mac_address: String, ip_address: Option<IpAddr>) -> Self {
        Self {
            rule_name,
            mac_address,
            ip_address,
            created_at: SystemTime::now(),
            direction: RuleDirection::Both,
            action: RuleAction::Block,
        }
    }

    /// IP address as a display string, if any.
    pub fn ip_string(&self) -> Option<String> {
        self.ip_address.map(|ip| ip.to_string())
    }
}

/// Rule name for a canonical MAC: the prefix followed by the MAC without separators.
pub fn rule_name_for(prefix: &str, canonical_mac: &str) -> String {
    format!("{}{}", prefix, crate::utils::compact_mac(canonical_mac))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name_is_deterministic() {
        assert_eq!(
            rule_name_for("NetBlock_", "AA:BB:CC:DD:EE:FF"),
            "NetBlock_AABBCCDDEEFF"
        );
        assert_eq!(
            rule_name_for("NetBlock_", "AA:BB:CC:DD:EE:FF"),
            rule_name_for("NetBlock_", "AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = BlockResult::fail_with_details(
            ErrorCode::CommandFailed,
            "Failed to block device",
            "iptables: Permission denied",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "CommandFailed");
        assert_eq!(json["errorDetails"], "iptables: Permission denied");

        let ok = serde_json::to_value(BlockResult::ok("done")).unwrap();
        assert!(ok.get("errorDetails").is_none());
        assert_eq!(ok["errorCode"], "None");
    }
}
