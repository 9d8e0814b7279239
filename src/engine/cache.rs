//! In-memory index of the rules an engine has applied.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::engine::result::FirewallRule;

/// Map from canonical MAC to its active rule.
///
/// Reads are lock-free with respect to the engine's mutation lock; writers are
/// expected to hold that lock so check-then-insert sequences stay atomic.
#[derive(Debug, Default)]
pub struct RuleCache {
    rules: RwLock<HashMap<String, FirewallRule>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.rules.read().contains_key(mac)
    }

    pub fn get(&self, mac: &str) -> Option<FirewallRule> {
        self.rules.read().get(mac).cloned()
    }

    /// Insert a rule. Returns false, leaving the cache unchanged, if the MAC is present.
    pub fn insert(&self, rule: FirewallRule) -> bool {
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.mac_address) {
            return false;
        }
        rules.insert(rule.mac_address.clone(), rule);
        true
    }

    pub fn remove(&self, mac: &str) -> Option<FirewallRule> {
        self.rules.write().remove(mac)
    }

    /// Snapshot of all rules, ordered by MAC.
    pub fn snapshot(&self) -> Vec<FirewallRule> {
        let mut rules: Vec<FirewallRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.mac_address.cmp(&b.mac_address));
        rules
    }

    /// Remove and return every rule.
    pub fn drain(&self) -> Vec<FirewallRule> {
        let mut rules: Vec<FirewallRule> = self.rules.write().drain().map(|(_, r)| r).collect();
        rules.sort_by(|a, b| a.mac_address.cmp(&b.mac_address));
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}
