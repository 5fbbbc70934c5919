pub mod cache_key;
pub mod chunker;

mod cache_gc;
mod cache_service;
mod job_queue;
mod pipeline;
mod summary_worker;
mod upload_service;

pub use cache_gc::{CacheGc, GcStats};
pub use cache_service::{CacheService, CacheServiceError, LookupResult, ResolvedSource};
pub use job_queue::{CancelRegistry, JobDequeue, JobQueue, StageLimits, StageWaitTimeout};
pub use pipeline::{
    Pipeline, PipelineError, PipelineThresholds, StageContext, EMPTY_TRANSCRIPT_MARKER,
};
pub use summary_worker::{sweep_interrupted, SummaryWorker};
pub use upload_service::{sanitize_filename, UploadError, UploadService};
