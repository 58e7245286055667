use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter` when set. Fails if a
/// subscriber is already installed or the filter does not parse.
pub fn init(default_filter: &str) -> crate::error::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_filter),
    }
    .map_err(|e| crate::error::CvError::config(format!("Invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| crate::error::CvError::config(format!("Failed to install logger: {e}")))
}
