use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ffmpeg_sidecar::command::FfmpegCommand;

use crate::application::ports::{AudioExtractor, AudioStats, ExtractError};

const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Verify the ffmpeg binary is reachable before accepting work.
pub fn check_ffmpeg_binary() -> Result<(), ExtractError> {
    let mut child = FfmpegCommand::new()
        .arg("-version")
        .spawn()
        .map_err(|e| ExtractError::ToolUnavailable(format!("ffmpeg not found in $PATH: {}", e)))?;

    let status = child
        .wait()
        .map_err(|e| ExtractError::ToolUnavailable(format!("ffmpeg version check: {}", e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(ExtractError::ToolUnavailable(
            "ffmpeg returned non-zero exit during version check".to_string(),
        ))
    }
}

/// ffmpeg-backed audio extraction: mono 16 kHz wav plus an RMS measurement
/// taken from the decoded samples for the silence heuristic.
pub struct FfmpegAudioExtractor;

impl FfmpegAudioExtractor {
    fn extract_sync(video: &Path, wav_out: &Path) -> Result<AudioStats, ExtractError> {
        let video = video.to_path_buf();
        let wav_out = wav_out.to_path_buf();

        let status = FfmpegCommand::new()
            .args([
                "-y",
                "-i",
                video.to_str().unwrap_or_default(),
                "-vn",
                "-ar",
                "16000",
                "-ac",
                "1",
                wav_out.to_str().unwrap_or_default(),
            ])
            .spawn()
            .map_err(|e| ExtractError::Failed(format!("ffmpeg spawn: {}", e)))?
            .wait()
            .map_err(|e| ExtractError::Failed(format!("ffmpeg wait: {}", e)))?;

        if !status.success() {
            return Err(ExtractError::Failed(
                "ffmpeg exited with non-zero status during audio extraction".to_string(),
            ));
        }

        Self::measure_sync(&video)
    }

    /// Decode to raw s16le on stdout and fold the samples into RMS.
    fn measure_sync(video: &PathBuf) -> Result<AudioStats, ExtractError> {
        let mut child = FfmpegCommand::new()
            .args([
                "-i",
                video.to_str().unwrap_or_default(),
                "-vn",
                "-ar",
                "16000",
                "-ac",
                "1",
                "-f",
                "s16le",
                "pipe:1",
            ])
            .spawn()
            .map_err(|e| ExtractError::Failed(format!("ffmpeg spawn: {}", e)))?;

        let mut stdout = child
            .take_stdout()
            .ok_or_else(|| ExtractError::Failed("ffmpeg stdout unavailable".to_string()))?;

        let mut buf = [0u8; 64 * 1024];
        let mut carry: Option<u8> = None;
        let mut sum_squares: f64 = 0.0;
        let mut sample_count: u64 = 0;

        loop {
            let n = stdout
                .read(&mut buf)
                .map_err(|e| ExtractError::Failed(format!("reading ffmpeg stdout: {}", e)))?;
            if n == 0 {
                break;
            }

            let mut bytes: Vec<u8> = Vec::with_capacity(n + 1);
            if let Some(prev) = carry.take() {
                bytes.push(prev);
            }
            bytes.extend_from_slice(&buf[..n]);
            if bytes.len() % 2 == 1 {
                carry = bytes.pop();
            }

            for pair in bytes.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64 / i16::MAX as f64;
                sum_squares += sample * sample;
                sample_count += 1;
            }
        }

        child
            .wait()
            .map_err(|e| ExtractError::Failed(format!("ffmpeg wait: {}", e)))?;

        let rms = if sample_count == 0 {
            0.0
        } else {
            (sum_squares / sample_count as f64).sqrt() as f32
        };
        let duration_secs = if sample_count == 0 {
            None
        } else {
            Some(sample_count as f64 / TARGET_SAMPLE_RATE as f64)
        };

        Ok(AudioStats { rms, duration_secs })
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract_wav(&self, video: &Path, wav_out: &Path) -> Result<AudioStats, ExtractError> {
        let video = video.to_path_buf();
        let wav_out = wav_out.to_path_buf();

        let stats = tokio::task::spawn_blocking(move || Self::extract_sync(&video, &wav_out))
            .await
            .map_err(|e| ExtractError::Failed(format!("extraction task panicked: {}", e)))??;

        tracing::debug!(
            rms = stats.rms,
            duration = ?stats.duration_secs,
            "Audio extracted"
        );
        Ok(stats)
    }
}
