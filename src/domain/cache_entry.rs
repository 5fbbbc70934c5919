use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CacheKey, SourceType};

/// Lifecycle state of a cache entry.
///
/// `pending → running → completed | failed`; a refresh resets a terminal
/// entry back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Running => "running",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "running" => Ok(EntryStatus::Running),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            _ => Err(format!("invalid entry status: {}", s)),
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable row capturing the lifecycle and result of processing one source
/// identity.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub cache_key: CacheKey,
    pub source_type: SourceType,
    /// Normalized URL or file hash. For human inspection only; matching is
    /// always by `cache_key`.
    pub source_ref: String,
    pub source_name: Option<String>,
    pub status: EntryStatus,
    pub profile_version: String,
    pub summary_text: Option<String>,
    pub bundle_path: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
}
