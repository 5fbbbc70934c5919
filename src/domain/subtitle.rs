use serde::{Deserialize, Serialize};

/// One timed text segment of a parsed subtitle or transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}

impl SubtitleSegment {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            translated_text: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Ordered sequence of subtitle segments.
///
/// After [`SubtitleTrack::normalize`] segments are sorted by start time,
/// non-overlapping, and consecutive duplicate texts are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub segments: Vec<SubtitleSegment>,
}

impl SubtitleTrack {
    pub fn new(segments: Vec<SubtitleSegment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Sort by start time, merge consecutive segments with identical text,
    /// and clamp overlaps so timestamps are monotone.
    pub fn normalize(mut self) -> Self {
        self.segments.sort_by_key(|s| (s.start_ms, s.end_ms));

        let mut merged: Vec<SubtitleSegment> = Vec::with_capacity(self.segments.len());
        for seg in self.segments {
            if seg.text.trim().is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if prev.text == seg.text => {
                    prev.end_ms = prev.end_ms.max(seg.end_ms);
                }
                Some(prev) => {
                    let mut seg = seg;
                    if seg.start_ms < prev.end_ms {
                        seg.start_ms = prev.end_ms.min(seg.end_ms);
                    }
                    merged.push(seg);
                }
                None => merged.push(seg),
            }
        }

        Self { segments: merged }
    }

    /// Total covered time: the sum of per-segment durations, not the
    /// first-to-last span.
    pub fn covered_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms()).sum()
    }

    /// Plain-text rendition fed to the summarizer.
    pub fn to_transcript(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(seg.text.trim());
        }
        out
    }
}
