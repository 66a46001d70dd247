//! Operator-facing tracing setup.
//!
//! Tenant-visible logs go through [`crate::flow::provider::LogProvider`];
//! this module only configures the process-level `tracing` pipeline.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: `RUST_LOG` filtering (defaulting to
/// `info` for this crate), compact output, and span traces attached to
/// errors. Call once at startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,flowcord=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(ErrorLayer::default())
        .init();
}
