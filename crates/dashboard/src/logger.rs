use std::env;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Events from this binary are targeted `logwatch::*`, after the bin name.
const DEFAULT_FILTER: &str = "logwatch=info,dashboard_core=info,backend_client=info";

/// Install the tracing subscriber. Output goes to stderr so stdout only carries the feed.
pub fn init_logging() {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
