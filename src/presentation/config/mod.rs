mod settings;

pub use settings::{
    AsrSettings, CacheSettings, Environment, LlmSettings, LoggingSettings, PipelineSettings,
    ServerSettings, Settings, UploadSettings, WorkspaceSettings,
};
