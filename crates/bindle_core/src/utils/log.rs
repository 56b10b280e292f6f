use tracing_subscriber::EnvFilter;

/// Opt into tracing output via the `TRACE` environment variable, e.g.
/// `TRACE=bindle_core=trace cargo test`. Safe to call repeatedly.
pub fn enable_tracing_by_env() {
    if std::env::var("TRACE").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_env("TRACE"))
            .with_test_writer()
            .try_init();
    }
}
