use tracing_subscriber::EnvFilter;

/// Install the process-wide `tracing` subscriber (§6). `log_level` seeds the
/// filter when `RUST_LOG` isn't set, matching the teacher's
/// `EnvFilter::from_default_env()` + explicit fallback pattern.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
