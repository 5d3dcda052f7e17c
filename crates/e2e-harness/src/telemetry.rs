//! Log setup for the `e2e` binary.
//!
//! Harness events are shown at the requested level; everything else
//! (tokio, dependencies) only at `warn`. `RUST_LOG` replaces both.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crate targets that follow the requested level.
const HARNESS_TARGETS: [&str; 2] = ["e2e_harness", "e2e"];

/// Install the global subscriber, writing to stderr.
///
/// stdout carries the run report, so log lines never go there. With `json`
/// each event is one JSON object per line. Only the first call per process
/// takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(HARNESS_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}
