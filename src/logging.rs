//! Logging Initialization
//!
//! Host applications that already own a tracing subscriber can skip this;
//! the crate only emits `tracing` events and never installs a subscriber on
//! its own.

/// Installs a stdout subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    // Avoid panics if already initialized (tests, embedding hosts).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(cfg!(debug_assertions))
        .try_init();
}
