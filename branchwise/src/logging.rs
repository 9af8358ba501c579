//! Diagnostic tracing for debugging branchwise.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG` or `--verbose`,
//!   written to stderr. Not part of the command's output.
//!
//! - **Command output**: the git commands a run executes, links and outcome
//!   messages go to stdout and are unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `branchwise=debug` when
/// `verbose` is set and `RUST_LOG` is not.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=branchwise=trace branchwise sync
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,branchwise=debug" } else { "warn" }
}
