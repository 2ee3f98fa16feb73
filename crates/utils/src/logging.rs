//! provides logging helpers

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber with the given default level
///
/// `RUST_LOG` still takes precedence over `default_level`. Calling this more
/// than once is a no-op after the first subscriber is installed.
pub fn init_with_default(default_level: filter::LevelFilter) {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    let _ = registry().with(fmt_layer).try_init();
}
