use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_petitions: i64,
    pub total_users: i64,
    pub pending_petitions: i64,
    /// Petition count per status; statuses with no petitions are absent.
    pub distribution_by_status: BTreeMap<String, i64>,
}

impl AdminStats {
    pub fn from_status_counts(total_users: i64, counts: Vec<(String, i64)>) -> Self {
        let distribution_by_status: BTreeMap<String, i64> = counts.into_iter().collect();
        Self {
            total_petitions: distribution_by_status.values().sum(),
            total_users,
            pending_petitions: distribution_by_status.get("pending").copied().unwrap_or(0),
            distribution_by_status,
        }
    }
}
