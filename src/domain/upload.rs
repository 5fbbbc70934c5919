use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FileHash, FileId};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "flv", "wmv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "ogg", "wma"];
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "vtt", "ass", "ssa", "sub"];

const VIDEO_MIMES: &[&str] = &[
    "video/mp4",
    "video/x-matroska",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-flv",
    "video/x-ms-wmv",
];
const AUDIO_MIMES: &[&str] = &[
    "audio/mpeg",
    "audio/wav",
    "audio/x-wav",
    "audio/flac",
    "audio/aac",
    "audio/mp4",
    "audio/ogg",
    "audio/x-ms-wma",
];
const SUBTITLE_MIMES: &[&str] = &["text/plain", "text/vtt", "application/x-subrip", "text/x-ssa"];

/// Logical type of an uploaded file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Video,
    Audio,
    Subtitle,
}

impl FileType {
    /// Map a lowercase extension (without dot) onto the allow-list.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(FileType::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(FileType::Audio)
        } else if SUBTITLE_EXTENSIONS.contains(&ext) {
            Some(FileType::Subtitle)
        } else {
            None
        }
    }

    /// Whether a declared MIME type agrees with this file type.
    ///
    /// `application/octet-stream` is accepted for any allow-listed extension;
    /// subtitle files in the wild carry inconsistent MIME types, so anything
    /// textual passes for them.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        if mime == "application/octet-stream" {
            return true;
        }
        match self {
            FileType::Video => VIDEO_MIMES.contains(&mime),
            FileType::Audio => AUDIO_MIMES.contains(&mime),
            FileType::Subtitle => SUBTITLE_MIMES.contains(&mime) || mime.starts_with("text/"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Subtitle => "subtitle",
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(FileType::Video),
            "audio" => Ok(FileType::Audio),
            "subtitle" => Ok(FileType::Subtitle),
            _ => Err(format!("invalid file type: {}", s)),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record for one uploaded file.
///
/// `file_id` is unique; `file_hash` may be shared between records when
/// identical content was uploaded more than once (the records then point at
/// the same `stored_path`).
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub file_id: FileId,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    pub file_hash: FileHash,
    pub stored_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list_maps_types() {
        assert_eq!(FileType::from_extension("mp4"), Some(FileType::Video));
        assert_eq!(FileType::from_extension("flac"), Some(FileType::Audio));
        assert_eq!(FileType::from_extension("srt"), Some(FileType::Subtitle));
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn octet_stream_is_accepted_for_any_type() {
        assert!(FileType::Video.accepts_mime("application/octet-stream"));
        assert!(FileType::Subtitle.accepts_mime("application/octet-stream"));
    }

    #[test]
    fn mismatched_mime_is_rejected() {
        assert!(!FileType::Video.accepts_mime("audio/mpeg"));
        assert!(FileType::Audio.accepts_mime("audio/mpeg"));
    }
}
