use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr; stdout is reserved for command output.
/// `RUST_LOG` wins over the configured filter.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
