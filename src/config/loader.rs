//! Configuration loader from ~/.netblock-settings.json.

use std::path::{Path, PathBuf};

use crate::config::schema::NetblockConfig;
use crate::error::{ConfigError, NetblockError};

/// Default settings file name.
const DEFAULT_SETTINGS_FILE: &str = ".netblock-settings.json";

/// Get the default settings file path.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_SETTINGS_FILE))
}

/// Load configuration from a file path.
pub fn load_config(path: &Path) -> Result<NetblockConfig, NetblockError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()).into());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("Failed to read config file: {}", e)))?;

    let mut config = parse_config(&content)?;

    // Relative device files are resolved against the settings file location
    if let (Some(devices), Some(dir)) = (config.devices_file.as_ref(), path.parent()) {
        if devices.is_relative() {
            config.devices_file = Some(dir.join(devices));
        }
    }

    Ok(config)
}

/// Load configuration from the default path, or return default config if not found.
pub fn load_default_config() -> Result<NetblockConfig, NetblockError> {
    match default_settings_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(NetblockConfig::default()),
    }
}

/// Parse configuration from a JSON string.
pub fn parse_config(json: &str) -> Result<NetblockConfig, NetblockError> {
    let config: NetblockConfig = serde_json::from_str(json)
        .map_err(|e| ConfigError::ParseError(format!("Failed to parse config JSON: {}", e)))?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.chain_name, "NETBLOCK");
        assert_eq!(config.rule_prefix, "NetBlock_");
        assert_eq!(config.command_timeout_ms, 10_000);
        assert!(config.devices_file.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "chainName": "LAN_BLOCK",
            "rulePrefix": "Lan_",
            "linkLayerBlocking": false,
            "commandTimeoutMs": 500,
            "restoreDelayMs": 0,
            "devicesFile": "/var/lib/netblock/devices.json",
            "protectedMacs": ["aa:bb:cc:dd:ee:ff"],
            "protectLocalInterfaces": false,
            "iptablesCommand": "/usr/sbin/iptables-legacy"
        }"#;

        let config = parse_config(json).unwrap();
        assert_eq!(config.chain_name, "LAN_BLOCK");
        assert_eq!(config.rule_prefix, "Lan_");
        assert!(!config.link_layer_blocking);
        assert_eq!(config.command_timeout_ms, 500);
        assert_eq!(config.restore_delay_ms, 0);
        assert_eq!(
            config.devices_file,
            Some(PathBuf::from("/var/lib/netblock/devices.json"))
        );
        assert_eq!(config.protected_macs.len(), 1);
        assert!(!config.protect_local_interfaces);
        assert_eq!(config.iptables_command, "/usr/sbin/iptables-legacy");
        assert_eq!(config.ebtables_command, "ebtables");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(parse_config("not json").is_err());
        assert!(parse_config(r#"{"chainName": "OUTPUT"}"#).is_err());
        assert!(parse_config(r#"{"commandTimeoutMs": 0}"#).is_err());
        assert!(parse_config(r#"{"protectedMacs": ["zz"]}"#).is_err());
    }

    #[test]
    fn test_load_config_resolves_relative_devices_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        std::fs::write(&settings, r#"{"devicesFile": "devices.json"}"#).unwrap();

        let config = load_config(&settings).unwrap();
        assert_eq!(config.devices_file, Some(dir.path().join("devices.json")));
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(&dir.path().join("missing.json"));
        assert!(matches!(
            result,
            Err(NetblockError::Config(ConfigError::FileNotFound(_)))
        ));
    }
}
