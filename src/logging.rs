//! Tracing subscriber setup
//!
//! The embedding binary calls [`init`] once at startup. `RUST_LOG` wins over
//! the configured level when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;

/// Install the global tracing subscriber. Call once.
pub fn init(args: &Args) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("granary={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
