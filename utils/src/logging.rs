//! Structured logging initialization via `tracing`.

/// Initialize the tracing subscriber with the configured default level.
///
/// The `RUST_LOG` environment variable, when set, overrides the configured
/// level. Safe to call more than once (subsequent calls are no-ops), which
/// keeps multi-server test setups simple.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
