// src/utils/telemetry.rs
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. Level comes from `RUST_LOG`, default `info`.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
