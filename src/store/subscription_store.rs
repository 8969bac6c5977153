use std::collections::BTreeMap;
use std::sync::RwLock;

use log::info;

use super::StoreError;
use crate::models::{ChainRule, Subscription};

/// Subscription and chain rule access
pub trait SubscriptionStore: Send + Sync {
    fn get_subscription(&self, id: u64) -> Result<Subscription, StoreError>;

    fn find_by_name(&self, name: &str) -> Result<Subscription, StoreError>;

    /// Chain rules of a subscription, ordered by id
    fn chain_rules(&self, subscription_id: u64) -> Result<Vec<ChainRule>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    subscriptions: BTreeMap<u64, Subscription>,
    chain_rules: BTreeMap<u64, ChainRule>,
}

/// In-memory subscription store
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    tables: RwLock<Tables>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscription. Names must stay unique.
    pub fn upsert_subscription(&self, subscription: Subscription) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(other) = tables
            .subscriptions
            .values()
            .find(|s| s.name == subscription.name && s.id != subscription.id)
        {
            return Err(StoreError::Conflict(format!(
                "name '{}' is taken by subscription #{}",
                subscription.name, other.id
            )));
        }
        tables.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    /// Insert or replace a chain rule of an existing subscription
    pub fn upsert_chain_rule(&self, rule: ChainRule) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if !tables.subscriptions.contains_key(&rule.subscription_id) {
            return Err(StoreError::NotFound(format!(
                "subscription #{}",
                rule.subscription_id
            )));
        }
        tables.chain_rules.insert(rule.id, rule);
        Ok(())
    }

    pub fn delete_chain_rule(&self, id: u64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.chain_rules.remove(&id).is_some())
    }

    /// Delete a subscription together with its chain rules
    pub fn delete_subscription(&self, id: u64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if tables.subscriptions.remove(&id).is_none() {
            return Ok(false);
        }
        let before = tables.chain_rules.len();
        tables.chain_rules.retain(|_, rule| rule.subscription_id != id);
        info!(
            "Deleted subscription #{} and {} chain rule(s)",
            id,
            before - tables.chain_rules.len()
        );
        Ok(true)
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn get_subscription(&self, id: u64) -> Result<Subscription, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        tables
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("subscription #{}", id)))
    }

    fn find_by_name(&self, name: &str) -> Result<Subscription, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        tables
            .subscriptions
            .values()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("subscription '{}'", name)))
    }

    fn chain_rules(&self, subscription_id: u64) -> Result<Vec<ChainRule>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables
            .chain_rules
            .values()
            .filter(|rule| rule.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetConfig;

    fn rule(id: u64, subscription_id: u64) -> ChainRule {
        ChainRule {
            id,
            subscription_id,
            name: String::new(),
            sort: 0,
            enabled: true,
            chain: Vec::new(),
            target: TargetConfig::All,
        }
    }

    fn subscription(id: u64, name: &str) -> Subscription {
        Subscription {
            id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_delete_cascades_to_chain_rules() {
        let store = MemorySubscriptionStore::new();
        store.upsert_subscription(subscription(1, "a")).unwrap();
        store.upsert_subscription(subscription(2, "b")).unwrap();
        store.upsert_chain_rule(rule(10, 1)).unwrap();
        store.upsert_chain_rule(rule(11, 1)).unwrap();
        store.upsert_chain_rule(rule(12, 2)).unwrap();
        store.upsert_chain_rule(rule(13, 2)).unwrap();
        assert!(store.delete_chain_rule(13).unwrap());
        assert!(!store.delete_chain_rule(13).unwrap());

        assert!(store.delete_subscription(1).unwrap());
        assert!(store.chain_rules(1).unwrap().is_empty());
        assert_eq!(store.chain_rules(2).unwrap().len(), 1);
        assert!(matches!(
            store.get_subscription(1),
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.delete_subscription(1).unwrap());
    }

    #[test]
    fn test_rule_requires_subscription() {
        let store = MemorySubscriptionStore::new();
        assert!(store.upsert_chain_rule(rule(1, 42)).is_err());
    }

    #[test]
    fn test_names_are_unique() {
        let store = MemorySubscriptionStore::new();
        store.upsert_subscription(subscription(1, "daily")).unwrap();
        assert!(store.upsert_subscription(subscription(2, "daily")).is_err());
        // Re-saving the same subscription keeps its name
        store.upsert_subscription(subscription(1, "daily")).unwrap();
        assert_eq!(store.find_by_name("daily").unwrap().id, 1);
    }
}
