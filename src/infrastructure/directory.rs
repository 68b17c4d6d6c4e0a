use std::collections::HashMap;

use crate::domain::errors::OrderError;
use crate::domain::ports::MarketingGroupDirectory;

/// Marketing-group membership loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketingGroups {
    by_user: HashMap<i64, String>,
}

impl StaticMarketingGroups {
    pub fn new(by_user: HashMap<i64, String>) -> Self {
        Self { by_user }
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

impl MarketingGroupDirectory for StaticMarketingGroups {
    fn marketing_group(&self, user_id: i64) -> Result<Option<String>, OrderError> {
        Ok(self
            .by_user
            .get(&user_id)
            .filter(|group| !group.is_empty())
            .cloned())
    }
}
