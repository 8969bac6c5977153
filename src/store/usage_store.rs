use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::StoreError;

/// Traffic counters reported by an airport (upstream provider)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirportUsage {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    /// Unix timestamp, 0 when unknown
    pub expire: u64,
}

/// Usage lookup keyed by airport id (a node's `source_id`)
pub trait UsageStore: Send + Sync {
    fn usage(&self, airport_id: u64) -> Result<Option<AirportUsage>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    usage: RwLock<HashMap<u64, AirportUsage>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, airport_id: u64, usage: AirportUsage) {
        if let Ok(mut map) = self.usage.write() {
            map.insert(airport_id, usage);
        }
    }
}

impl UsageStore for MemoryUsageStore {
    fn usage(&self, airport_id: u64) -> Result<Option<AirportUsage>, StoreError> {
        let map = self.usage.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&airport_id).copied())
    }
}
