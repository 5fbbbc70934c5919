use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. JSON output is the
/// production format; the pretty layer additionally records source
/// locations for local debugging.
pub fn init_tracing(default_filter: &str, json_format: bool, port: u16, work_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if json_format {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    tracing::info!(
        port,
        work_dir = %work_dir.display(),
        json_format,
        "Logging initialized"
    );
}
