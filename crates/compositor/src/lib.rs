//! Windowing display server
//!
//! A single-process compositor that multiplexes clients onto one screen:
//! windows are shared-memory framebuffers arranged in three z-bands, input
//! is routed through an interaction state machine, and a render thread
//! repaints only damaged regions at roughly 60 fps.
//!
//! This library exposes the server modules for the `compositor` binary and
//! for the test harness, which runs a whole server in-process.

pub mod backend;
pub mod channel;
pub mod config;
pub mod cursor;
pub mod damage;
pub mod dispatch;
pub mod focus;
pub mod fonts;
pub mod geometry;
pub mod input;
pub mod input_sources;
pub mod render;
pub mod resize;
pub mod server;
pub mod setup;
pub mod shm;
pub mod state;

/// Initialize structured logging once, honouring `RUST_LOG` and `NO_COLOR`.
pub fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_ansi = std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(use_ansi))
        .with(filter)
        .init();
}
