use std::sync::Arc;

use crate::application::services::{CacheService, CancelRegistry, JobQueue, UploadService};
use crate::presentation::rate_limit::ApiRateLimits;

/// Shared handler state. Everything is behind `Arc`, so cloning per request
/// is cheap.
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub cache: Arc<CacheService>,
    pub queue: Arc<JobQueue>,
    pub cancels: Arc<CancelRegistry>,
    pub rate_limits: Arc<ApiRateLimits>,
    pub version: &'static str,
}
