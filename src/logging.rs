use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Level filtering comes from `RUST_LOG` (default: info). Output is
/// written to stderr so stdout stays a clean IPC channel.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
