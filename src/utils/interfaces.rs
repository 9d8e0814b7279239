//! Discovery of this host's own link-layer addresses.

use crate::utils::address::normalize_mac;

/// Sysfs directory listing network interfaces on Linux.
#[cfg(target_os = "linux")]
const SYS_CLASS_NET: &str = "/sys/class/net";

/// Collect the canonical MAC addresses of this host's interfaces.
///
/// Loopback and all-zero addresses are skipped. On platforms without a cheap
/// source for this information an empty list is returned.
pub fn local_mac_addresses() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        let entries = match std::fs::read_dir(SYS_CLASS_NET) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list {}: {}", SYS_CLASS_NET, e);
                return Vec::new();
            }
        };

        let contents = entries
            .flatten()
            .filter_map(|entry| std::fs::read_to_string(entry.path().join("address")).ok());
        collect_macs(contents)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

fn collect_macs<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut macs: Vec<String> = raw
        .into_iter()
        .filter_map(|s| normalize_mac(s.as_ref()))
        .filter(|mac| mac != "00:00:00:00:00:00")
        .collect();
    macs.sort();
    macs.dedup();
    macs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_macs_skips_loopback_and_duplicates() {
        let raw = vec![
            "00:00:00:00:00:00\n",
            "52:54:00:12:34:56\n",
            "52:54:00:12:34:56\n",
            "garbage",
        ];
        assert_eq!(collect_macs(raw), vec!["52:54:00:12:34:56".to_string()]);
    }

    #[test]
    fn test_local_mac_addresses_are_canonical() {
        for mac in local_mac_addresses() {
            assert_eq!(normalize_mac(&mac), Some(mac.clone()));
        }
    }
}
