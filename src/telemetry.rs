//! Opt-in tracing bootstrap.
//!
//! The engine emits all diagnostics through `tracing`; nothing is printed
//! unless a subscriber is installed. Binaries and tests that want console
//! output can call [`init_tracing`] once at startup and control verbosity
//! with `RUST_LOG` (e.g. `RUST_LOG=pflow=debug`).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a console subscriber honoring `RUST_LOG`, defaulting to `info`.
///
/// Calling this more than once is harmless; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
