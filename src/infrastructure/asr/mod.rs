mod http_transcriber;
mod mock;

pub use http_transcriber::HttpTranscriber;
pub use mock::MockTranscriber;
