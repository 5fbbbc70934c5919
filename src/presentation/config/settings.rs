use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Typed service configuration, loaded from environment variables with
/// defaults that work out of the box for a single local instance.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub workspace: WorkspaceSettings,
    pub logging: LoggingSettings,
    pub uploads: UploadSettings,
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub asr: AsrSettings,
    pub llm: LlmSettings,
}

/// Deployment flavor, from `APP_ENV`. Its only effect inside the service is
/// on logging defaults: prod emits JSON, everything else gets the pretty
/// layer with source locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Test,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    pub fn json_logs_by_default(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Environment::Local),
            "test" | "ci" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("invalid environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub json_format: bool,
    /// Applied when `RUST_LOG` is unset.
    pub default_filter: String,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub concurrency: usize,
    pub rate_per_minute: u32,
    pub chunk_size: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub admission_wait_secs: u64,
    pub content_length_grace_bytes: u64,
    pub max_file_size: u64,
    pub ttl_secs: u64,
    pub reaper_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub transcode_concurrency: usize,
    pub transcribe_concurrency: usize,
    pub stage_wait_secs: u64,
    pub coverage_min: f64,
    pub density_min_per_minute: f64,
    pub rms_max: f32,
    pub tokens_per_min_min: f64,
    pub chunk_size_chars: usize,
    pub chunk_overlap_chars: usize,
    pub summary_min_chars: usize,
    pub video_max_size: u64,
    pub subtitle_max_size: u64,
    pub subtitle_download_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_days: u64,
    pub max_bytes: u64,
    pub failed_ttl_hours: u64,
    pub gc_interval_secs: u64,
    pub profile_version: String,
    pub strip_query_params: Vec<String>,
    pub summary_rate_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct AsrSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let environment: Environment = env_str("APP_ENV", "local")
            .parse()
            .unwrap_or(Environment::Local);

        Self {
            server: ServerSettings {
                host: env_str("SERVER_HOST", "0.0.0.0"),
                port: env_parse("SERVER_PORT", 8000),
                environment,
            },
            workspace: WorkspaceSettings {
                work_dir: PathBuf::from(env_str("WORK_DIR", "./work")),
            },
            logging: LoggingSettings {
                json_format: match std::env::var("LOG_FORMAT").ok().as_deref() {
                    Some("json") => true,
                    Some("pretty") => false,
                    _ => environment.json_logs_by_default(),
                },
                default_filter: env_str("LOG_FILTER", "info,recapd=debug,tower_http=debug"),
            },
            uploads: UploadSettings {
                concurrency: env_parse("UPLOAD_CONCURRENCY", 2),
                rate_per_minute: env_parse("UPLOAD_RATE_PER_MINUTE", 30),
                chunk_size: env_parse("UPLOAD_CHUNK_SIZE", 8 * 1024 * 1024),
                read_timeout_secs: env_parse("UPLOAD_READ_TIMEOUT", 30),
                write_timeout_secs: env_parse("UPLOAD_WRITE_TIMEOUT", 30),
                admission_wait_secs: env_parse("UPLOAD_ADMISSION_WAIT", 10),
                content_length_grace_bytes: env_parse(
                    "CONTENT_LENGTH_GRACE_BYTES",
                    10 * 1024 * 1024,
                ),
                max_file_size: env_parse("MAX_FILE_SIZE", 2 * 1024 * 1024 * 1024),
                ttl_secs: env_parse("UPLOAD_TTL", 24 * 3600),
                reaper_interval_secs: env_parse("UPLOAD_REAPER_INTERVAL", 3600),
            },
            pipeline: PipelineSettings {
                worker_count: env_parse("WORKER_COUNT", 1),
                queue_capacity: env_parse("QUEUE_CAPACITY", 64),
                transcode_concurrency: env_parse("TRANSCODE_CONCURRENCY", 2),
                transcribe_concurrency: env_parse("TRANSCRIBE_CONCURRENCY", 2),
                stage_wait_secs: env_parse("PIPELINE_STAGE_WAIT", 300),
                coverage_min: env_parse("SUBTITLE_COVERAGE_MIN", 0.8),
                density_min_per_minute: env_parse("SUBTITLE_DENSITY_MIN", 1.0),
                rms_max: env_parse("AUDIO_RMS_MAX", 0.01),
                tokens_per_min_min: env_parse("TOKENS_PER_MIN_MIN", 10.0),
                chunk_size_chars: env_parse("SUMMARY_CHUNK_SIZE_CHARS", 12_000),
                chunk_overlap_chars: env_parse("SUMMARY_CHUNK_OVERLAP_CHARS", 400),
                summary_min_chars: env_parse("SUMMARY_MIN_CHARS", 80),
                video_max_size: env_parse("VIDEO_MAX_SIZE", 2 * 1024 * 1024 * 1024),
                subtitle_max_size: env_parse("SUBTITLE_MAX_SIZE", 10 * 1024 * 1024),
                subtitle_download_timeout_secs: env_parse("SUBTITLE_DOWNLOAD_TIMEOUT", 60),
            },
            cache: CacheSettings {
                ttl_days: env_parse("CACHE_TTL_DAYS", 30),
                max_bytes: env_parse("CACHE_MAX_BYTES", 50 * 1024 * 1024 * 1024),
                failed_ttl_hours: env_parse("FAILED_TTL_HOURS", 24),
                gc_interval_secs: env_parse("GC_INTERVAL_SECONDS", 3600),
                profile_version: env_str("PROFILE_VERSION", "v1"),
                strip_query_params: env_str(
                    "URL_STRIP_PARAMS",
                    "utm_source,utm_medium,utm_campaign,utm_term,utm_content,fbclid,gclid",
                )
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                summary_rate_per_minute: env_parse("SUMMARY_RATE_PER_MINUTE", 60),
            },
            asr: AsrSettings {
                endpoint: env_str(
                    "ASR_ENDPOINT",
                    "https://api.openai.com/v1/audio/transcriptions",
                ),
                api_key: env_str("ASR_API_KEY", ""),
                model: env_str("ASR_MODEL", "whisper-1"),
                timeout_secs: env_parse("ASR_TIMEOUT", 600),
            },
            llm: LlmSettings {
                base_url: env_str("LLM_BASE_URL", "https://api.openai.com/v1"),
                api_key: env_str("LLM_API_KEY", ""),
                model: env_str("LLM_MODEL", "gpt-4o-mini"),
                max_tokens: env_parse("LLM_MAX_TOKENS", 1024),
                temperature: env_parse("LLM_TEMPERATURE", 0.3),
                timeout_secs: env_parse("LLM_TIMEOUT", 120),
            },
        }
    }
}
