mod audio_extractor;
mod bundle_store;
mod fetchers;
mod file_vault;
mod media_probe;
mod metadata_store;
mod store_error;
mod subtitle_parser;
mod summarizer;
mod transcriber;

pub use audio_extractor::{AudioExtractor, AudioStats, ExtractError};
pub use bundle_store::{BundleInvalid, BundleStore, BundleStoreError};
pub use fetchers::{FetchError, SubtitleFetcher, VideoFetcher};
pub use file_vault::{FileVault, StoredBlob, VaultError};
pub use media_probe::{MediaProbe, ProbeError, SourceProbe};
pub use metadata_store::{EntryUpdate, GetOrCreateOutcome, MetadataStore};
pub use store_error::StoreError;
pub use subtitle_parser::{SubtitleParseError, SubtitleParser};
pub use summarizer::{SummarizeError, Summarizer};
pub use transcriber::{TranscribeError, Transcriber};
