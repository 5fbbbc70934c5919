mod cache;
mod health;
mod jobs;
mod lookup;
mod summaries;
mod uploads;

pub mod requests;

pub use cache::{cache_delete_handler, cache_entry_handler};
pub use health::health_handler;
pub use jobs::job_status_handler;
pub use lookup::lookup_handler;
pub use summaries::summaries_handler;
pub use uploads::upload_handler;
