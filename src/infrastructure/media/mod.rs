mod ffmpeg_extractor;
mod mock;
mod ytdlp;

pub use ffmpeg_extractor::{check_ffmpeg_binary, FfmpegAudioExtractor};
pub use mock::{MockAudioExtractor, MockProbe, MockSubtitleFetcher, MockVideoFetcher};
pub use ytdlp::{YtDlpConfig, YtDlpProbe, YtDlpSubtitleFetcher, YtDlpVideoFetcher};
