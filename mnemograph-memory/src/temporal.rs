//! Record timestamps
//!
//! Every memory carries three clocks:
//! - **created_at**: set once when the record is first stored
//! - **modified_at**: bumped whenever name, type, metadata or tags change
//! - **last_accessed_at**: bumped on every read path that materializes the record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle timestamps for a memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last modified
    pub modified_at: DateTime<Utc>,

    /// When the record was last read
    pub last_accessed_at: DateTime<Utc>,
}

impl Timestamps {
    /// Timestamps for a record created right now
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Timestamps for a record created at a specific instant
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            modified_at: created_at,
            last_accessed_at: created_at,
        }
    }

    /// Record a read
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now().max(self.last_accessed_at);
    }

    /// Record a modification (also counts as an access)
    pub fn mark_modified(&mut self) {
        let now = Utc::now().max(self.modified_at);
        self.modified_at = now;
        self.last_accessed_at = now.max(self.last_accessed_at);
    }

    /// Time since the last read
    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_accessed_at
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}
