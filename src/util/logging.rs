use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing/logging based on environment variables. Verbose mode
/// raises the default level so intermediate agent steps show up without
/// setting RUST_LOG.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    subscriber.init();
}
