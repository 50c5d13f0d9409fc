use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber.
///
/// This should be called once by the embedding application (or by a test's
/// `#[ctor]`-style setup). Verbosity is controlled by `RUST_LOG`, defaulting
/// to `info` when unset, matching the `RUST_LOG`-driven convention used
/// throughout this codebase's ancestry.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
