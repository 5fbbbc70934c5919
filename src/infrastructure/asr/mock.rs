//! Mock transcriber for tests.

use std::path::Path;

use async_trait::async_trait;

use crate::application::ports::{TranscribeError, Transcriber};
use crate::domain::SubtitleTrack;

pub struct MockTranscriber {
    pub track: SubtitleTrack,
    pub fail: bool,
}

impl MockTranscriber {
    pub fn with_track(track: SubtitleTrack) -> Self {
        Self { track, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            track: SubtitleTrack::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<SubtitleTrack, TranscribeError> {
        if self.fail {
            return Err(TranscribeError::ApiRequestFailed(
                "mock transcriber failure".to_string(),
            ));
        }
        Ok(self.track.clone())
    }
}
