use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "folio=info,folio_core=info";

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`; logs go to stderr so stdout carries only command
/// output.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Err means a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
