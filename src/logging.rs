use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging plus a daily-rotated JSON log file under `logs/`.
///
/// `RUST_LOG` overrides the default `storefront=info` filter.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "storefront.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storefront=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The writer guard must outlive the process or buffered lines are lost.
    std::mem::forget(guard);
}
