//! The canonical fact about one file at one point in time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::MAIN_SEPARATOR;

/// A single file observation, either transient (from a live walk) or
/// durable (held in a persisted index).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Store-assigned identity; `None` for records that only exist for the
    /// duration of one walk. Never reused after deletion.
    pub id: Option<i64>,
    /// Root-relative path beginning with the path separator; the unit of
    /// identity used for matching across sides.
    pub key: String,
    /// Leaf filename, derived from `key`, kept for display and export.
    pub name: String,
    /// Content fingerprint at the moment of observation.
    pub fingerprint: String,
    /// Classifier-assigned label; absence is a valid value, not an error.
    pub content_type: Option<String>,
    /// Set once at first observation.
    pub created_at: DateTime<Utc>,
    /// Set on every re-observation that changes `fingerprint` or
    /// `content_type`; absent until the first update.
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Create a transient record for a freshly observed file.
    pub fn new(key: String, fingerprint: String, content_type: Option<String>) -> Self {
        let name = leaf_name(&key);
        Self {
            id: None,
            key,
            name,
            fingerprint,
            content_type,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Whether this record is held in a persisted store.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

fn leaf_name(key: &str) -> String {
    key.rsplit(MAIN_SEPARATOR)
        .next()
        .unwrap_or(key)
        .to_string()
}
