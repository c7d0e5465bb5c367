//! Logging init, shared by the batch runner binary and any test harness
//! that wants the same filter/format conventions.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global `tracing` subscriber: an `EnvFilter` seeded from
/// `RUST_LOG` (falling back to `default_directive` when unset) plus a
/// compact formatted layer. Safe to call once per process; a second
/// call is a logged no-op rather than a panic, since test binaries may
/// each try to initialize it.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true));
    if registry.try_init().is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("info");
        init("debug");
    }
}
