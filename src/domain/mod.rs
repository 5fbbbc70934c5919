mod cache_entry;
mod ids;
mod job;
mod manifest;
mod source;
mod subtitle;
mod upload;

pub use cache_entry::{CacheEntry, EntryStatus};
pub use ids::{CacheKey, FileHash, FileId, InvalidId, JobId};
pub use job::{Job, JobStatus};
pub use manifest::{
    ArtifactInfo, ArtifactKind, BundleManifest, SourceDocument, SummaryDocument,
    BUNDLE_FORMAT_VERSION,
};
pub use source::SourceType;
pub use subtitle::{SubtitleSegment, SubtitleTrack};
pub use upload::{FileType, UploadRecord};
