use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntryStatus, SourceType};

/// On-disk format version of `bundle.json`.
pub const BUNDLE_FORMAT_VERSION: &str = "v2";

/// One artifact inside a bundle, with path relative to the bundle directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

/// Artifact slots a bundle may carry. `video` and `subtitle` keep their
/// source extension; the rest have fixed names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactKind {
    Video,
    Audio,
    Subtitle,
    Asr,
    Summary,
}

impl ArtifactKind {
    pub fn key(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "video",
            ArtifactKind::Audio => "audio",
            ArtifactKind::Subtitle => "subtitle",
            ArtifactKind::Asr => "asr",
            ArtifactKind::Summary => "summary",
        }
    }

    /// Canonical file name inside the bundle. Media artifacts keep their
    /// source extension; extracted audio defaults to wav.
    pub fn file_name(&self, ext: Option<&str>) -> String {
        match self {
            ArtifactKind::Video => format!("video.{}", ext.unwrap_or("mp4")),
            ArtifactKind::Audio => format!("audio.{}", ext.unwrap_or("wav")),
            ArtifactKind::Subtitle => format!("subtitle.{}", ext.unwrap_or("vtt")),
            ArtifactKind::Asr => "asr.json".to_string(),
            ArtifactKind::Summary => "summary.json".to_string(),
        }
    }
}

/// Manifest written as `bundle.json` at the bundle root.
///
/// A reader that observes this file at the final bundle path observes a
/// fully-written bundle; it is written into staging immediately before the
/// promotion rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: String,
    pub profile_version: String,
    pub cache_key: String,
    pub source_type: SourceType,
    pub source_ref: String,
    #[serde(default)]
    pub source_name: Option<String>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactInfo>,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Contents of the `summary.json` artifact. Validated against the manifest
/// and the cache entry before an entry counts as a hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub summary_text: String,
    pub model: String,
    pub input_chars: u64,
    pub profile_version: String,
    pub created_at: DateTime<Utc>,
}

/// Sidecar `source.json` kept next to the manifest for human inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_type: SourceType,
    pub source_ref: String,
    #[serde(default)]
    pub source_name: Option<String>,
}
