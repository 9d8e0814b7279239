//! CLI parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// netblock - block devices on the local network through the OS firewall
#[derive(Parser, Debug)]
#[command(name = "netblock")]
#[command(about = "Block and unblock network devices by MAC address using the OS packet filter")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Path to settings file (default: ~/.netblock-settings.json)
    #[arg(short = 's', long = "settings", global = true)]
    pub settings: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Block a device
    Block {
        /// Device MAC address
        #[arg(long)]
        mac: String,
        /// Device IP address
        #[arg(long)]
        ip: Option<String>,
    },
    /// Remove a device's block rules
    Unblock {
        /// Device MAC address
        #[arg(long)]
        mac: String,
        /// Device IP address
        #[arg(long)]
        ip: Option<String>,
    },
    /// Re-apply blocks for every device marked blocked in the devices file
    Restore,
    /// Remove every rule this tool created
    Clear,
    /// Show the selected engine and whether it has the privileges it needs
    Check,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block() {
        let cli = Cli::try_parse_from([
            "netblock",
            "--json",
            "block",
            "--mac",
            "aa:bb:cc:dd:ee:ff",
            "--ip",
            "10.0.0.5",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(
            cli.command,
            Command::Block {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                ip: Some("10.0.0.5".to_string()),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["netblock", "restore", "-d", "-s", "/tmp/x.json"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(cli.command, Command::Restore);
    }

    #[test]
    fn test_block_requires_mac() {
        assert!(Cli::try_parse_from(["netblock", "block", "--ip", "10.0.0.5"]).is_err());
        assert!(Cli::try_parse_from(["netblock"]).is_err());
    }
}
