use serde::{Deserialize, Serialize};

/// One persisted mapping from a short id to an original URL.
///
/// The serialized field names are part of the on-disk format of the file
/// backend: one JSON object per line with `shortUrl`, `originalUrl`, `userID`
/// and an optional `isDeleted` that defaults to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedUrl {
    #[serde(rename = "shortUrl")]
    pub short_id: String,
    #[serde(rename = "originalUrl")]
    pub original_url: String,
    #[serde(rename = "userID")]
    pub owner_id: String,
    /// Soft-delete flag. Tombstoned rows stay in storage but are excluded
    /// from conflict checks and statistics.
    #[serde(rename = "isDeleted", default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

impl SavedUrl {
    /// Creates a live (not deleted) mapping.
    pub fn new(
        short_id: impl Into<String>,
        original_url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            short_id: short_id.into(),
            original_url: original_url.into(),
            owner_id: owner_id.into(),
            is_deleted: false,
        }
    }

    /// Returns `true` if `task` targets this row: both the short id and the
    /// owner must match exactly.
    pub fn is_targeted_by(&self, task: &DeleteTask) -> bool {
        self.short_id == task.short_id && self.owner_id == task.owner_id
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A request from an owner to soft-delete one of their short URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteTask {
    pub owner_id: String,
    pub short_id: String,
}

impl DeleteTask {
    pub fn new(owner_id: impl Into<String>, short_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            short_id: short_id.into(),
        }
    }
}

/// Aggregate over live rows, computed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of non-deleted URLs.
    pub urls: u64,
    /// Number of distinct owners among non-deleted URLs.
    pub users: u64,
}

impl Stats {
    /// Computes statistics from a set of rows, ignoring tombstones.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a SavedUrl>) -> Self {
        let mut owners = std::collections::HashSet::new();
        let mut urls = 0;

        for row in rows.into_iter().filter(|row| !row.is_deleted) {
            urls += 1;
            owners.insert(row.owner_id.as_str());
        }

        Self {
            urls,
            users: owners.len() as u64,
        }
    }
}
