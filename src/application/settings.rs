use std::sync::{Arc, RwLock};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::ports::CommissionConfig;

/// Group name of the ratio applied to every referrer.
pub const ALL_GROUPS: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRatio {
    pub group: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingGroup {
    pub name: String,
    pub owner: i64,
}

/// Immutable view of the commission configuration at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommissionSnapshot {
    pub ratios: Vec<CommissionRatio>,
    pub groups: Vec<MarketingGroup>,
}

impl CommissionSnapshot {
    /// Builds a snapshot from raw configuration items, one JSON document per
    /// item. Items that fail to parse, have an empty name or a negative ratio
    /// are dropped.
    pub fn from_items(ratio_items: &[String], group_items: &[String]) -> Self {
        let ratios = ratio_items
            .iter()
            .filter_map(|item| match serde_json::from_str::<CommissionRatio>(item) {
                Ok(conf) if !conf.group.is_empty() && conf.ratio >= 0.0 => Some(conf),
                Ok(conf) => {
                    warn!("ignoring commission ratio for group {:?}", conf.group);
                    None
                }
                Err(e) => {
                    warn!("ignoring malformed commission ratio {item:?}: {e}");
                    None
                }
            })
            .collect();
        let groups = group_items
            .iter()
            .filter_map(|item| match serde_json::from_str::<MarketingGroup>(item) {
                Ok(group) if !group.name.is_empty() => Some(group),
                Ok(_) => None,
                Err(e) => {
                    warn!("ignoring malformed marketing group {item:?}: {e}");
                    None
                }
            })
            .collect();
        Self { ratios, groups }
    }

    pub fn ratio(&self, group: &str) -> f64 {
        // later entries override earlier ones
        self.ratios
            .iter()
            .rev()
            .find(|conf| conf.group == group)
            .map_or(0.0, |conf| conf.ratio)
    }

    pub fn owner(&self, group: &str) -> Option<i64> {
        self.groups
            .iter()
            .find(|item| item.name == group)
            .map(|item| item.owner)
            .filter(|owner| *owner > 0)
    }
}

/// Shared, hot-swappable commission configuration.
///
/// Readers take a cheap `Arc` clone of the current snapshot; a refresh swaps
/// the whole snapshot at once, so a reader never sees half an update.
#[derive(Debug, Default)]
pub struct CommissionSettings {
    current: RwLock<Arc<CommissionSnapshot>>,
}

impl CommissionSettings {
    pub fn new(snapshot: CommissionSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<CommissionSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn replace(&self, snapshot: CommissionSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    pub fn refresh_from_items(&self, ratio_items: &[String], group_items: &[String]) {
        self.replace(CommissionSnapshot::from_items(ratio_items, group_items));
    }
}

impl CommissionConfig for CommissionSettings {
    fn commission_ratio(&self, group: &str) -> f64 {
        self.snapshot().ratio(group)
    }

    fn marketing_group_owner(&self, group: &str) -> Option<i64> {
        self.snapshot().owner(group)
    }
}
