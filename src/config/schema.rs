//! Configuration schema types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NetblockError};
use crate::utils::normalize_mac;

/// Default Linux custom chain name.
pub const DEFAULT_CHAIN_NAME: &str = "NETBLOCK";

/// Default prefix for every rule name netblock creates.
pub const DEFAULT_RULE_PREFIX: &str = "NetBlock_";

/// iptables caps chain names at 28 characters; the outbound chain adds `_OUT`.
pub const MAX_CHAIN_NAME_LEN: usize = 24;

fn default_chain_name() -> String {
    DEFAULT_CHAIN_NAME.to_string()
}

fn default_rule_prefix() -> String {
    DEFAULT_RULE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

fn default_restore_delay_ms() -> u64 {
    2_000
}

fn default_iptables() -> String {
    "iptables".to_string()
}

fn default_ebtables() -> String {
    "ebtables".to_string()
}

fn default_netsh() -> String {
    "netsh".to_string()
}

/// Main netblock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetblockConfig {
    /// Custom iptables chain holding every block rule (Linux).
    #[serde(default = "default_chain_name")]
    pub chain_name: String,

    /// Prefix of every rule name, used to find our rules among foreign ones.
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,

    /// Issue ebtables rules in addition to iptables (Linux).
    #[serde(default = "default_true")]
    pub link_layer_blocking: bool,

    /// Upper bound for a single OS command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Delay before restoration starts, giving the device store time to come up.
    #[serde(default = "default_restore_delay_ms")]
    pub restore_delay_ms: u64,

    /// JSON device list read by the file-backed device repository.
    #[serde(default)]
    pub devices_file: Option<PathBuf>,

    /// MACs that must never be blocked.
    #[serde(default)]
    pub protected_macs: Vec<String>,

    /// Also protect this host's own interface addresses.
    #[serde(default = "default_true")]
    pub protect_local_interfaces: bool,

    #[serde(default = "default_iptables")]
    pub iptables_command: String,

    #[serde(default = "default_ebtables")]
    pub ebtables_command: String,

    #[serde(default = "default_netsh")]
    pub netsh_command: String,
}

impl Default for NetblockConfig {
    fn default() -> Self {
        Self {
            chain_name: default_chain_name(),
            rule_prefix: default_rule_prefix(),
            link_layer_blocking: true,
            command_timeout_ms: default_command_timeout_ms(),
            restore_delay_ms: default_restore_delay_ms(),
            devices_file: None,
            protected_macs: Vec::new(),
            protect_local_interfaces: true,
            iptables_command: default_iptables(),
            ebtables_command: default_ebtables(),
            netsh_command: default_netsh(),
        }
    }
}

impl NetblockConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), NetblockError> {
        validate_chain_name(&self.chain_name)?;
        validate_rule_prefix(&self.rule_prefix)?;

        for mac in &self.protected_macs {
            if normalize_mac(mac).is_none() {
                return Err(ConfigError::InvalidMacAddress(mac.clone()).into());
            }
        }

        if self.command_timeout_ms == 0 {
            return Err(
                ConfigError::ValidationError("commandTimeoutMs must be positive".to_string())
                    .into(),
            );
        }

        for (key, value) in [
            ("iptablesCommand", &self.iptables_command),
            ("ebtablesCommand", &self.ebtables_command),
            ("netshCommand", &self.netsh_command),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} cannot be empty", key)).into());
            }
        }

        Ok(())
    }

    /// Configured protected MACs in canonical form.
    pub fn normalized_protected_macs(&self) -> Vec<String> {
        self.protected_macs
            .iter()
            .filter_map(|m| normalize_mac(m))
            .collect()
    }
}

fn validate_chain_name(name: &str) -> Result<(), NetblockError> {
    let fail = |reason: &str| -> Result<(), NetblockError> {
        Err(ConfigError::InvalidChainName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into())
    };

    if name.is_empty() {
        return fail("chain name cannot be empty");
    }
    if name.len() > MAX_CHAIN_NAME_LEN {
        return fail(&format!("chain name is longer than {} characters", MAX_CHAIN_NAME_LEN));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return fail(&format!("invalid character '{}' in chain name", ch));
    }
    // iptables would parse it as an option
    if name.starts_with('-') {
        return fail("chain name cannot start with '-'");
    }
    // Built-in chains would be flushed by clear-all
    if matches!(
        name.to_ascii_uppercase().as_str(),
        "INPUT" | "OUTPUT" | "FORWARD" | "PREROUTING" | "POSTROUTING"
    ) {
        return fail("chain name collides with a built-in chain");
    }

    Ok(())
}

fn validate_rule_prefix(prefix: &str) -> Result<(), NetblockError> {
    if prefix.is_empty() {
        return Err(ConfigError::InvalidRulePrefix {
            prefix: prefix.to_string(),
            reason: "rule prefix cannot be empty".to_string(),
        }
        .into());
    }

    if let Some(ch) = prefix
        .chars()
        .find(|c| c.is_whitespace() || *c == '"' || *c == '\'' || *c == '=')
    {
        return Err(ConfigError::InvalidRulePrefix {
            prefix: prefix.to_string(),
            reason: format!("invalid character '{}' in rule prefix", ch.escape_default()),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NetblockConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain_name, "NETBLOCK");
        assert!(config.link_layer_blocking);
    }

    #[test]
    fn test_chain_name_validation() {
        assert!(validate_chain_name("NETBLOCK").is_ok());
        assert!(validate_chain_name("device-block_1").is_ok());

        assert!(validate_chain_name("").is_err());
        assert!(validate_chain_name("INPUT").is_err());
        assert!(validate_chain_name("forward").is_err());
        assert!(validate_chain_name("has space").is_err());
        assert!(validate_chain_name("-X").is_err());
        assert!(validate_chain_name("-NETBLOCK").is_err());
        assert!(validate_chain_name(&"X".repeat(24)).is_ok());
        assert!(validate_chain_name(&"X".repeat(25)).is_err());
    }

    #[test]
    fn test_rule_prefix_validation() {
        assert!(validate_rule_prefix("NetBlock_").is_ok());
        assert!(validate_rule_prefix("").is_err());
        assert!(validate_rule_prefix("Net Block").is_err());
        assert!(validate_rule_prefix("name=").is_err());
    }

    #[test]
    fn test_protected_macs_are_validated_and_normalized() {
        let mut config = NetblockConfig {
            protected_macs: vec!["aa-bb-cc-dd-ee-ff".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.normalized_protected_macs(),
            vec!["AA:BB:CC:DD:EE:FF".to_string()]
        );

        config.protected_macs.push("not-a-mac".to_string());
        assert!(config.validate().is_err());
    }
}
