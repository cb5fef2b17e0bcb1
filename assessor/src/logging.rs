//! Diagnostics for the assessor CLI.
//!
//! Tracing output goes to stderr and is controlled by `RUST_LOG`. Session
//! output of `assessor run` (progress lines, result summaries) is printed to
//! stdout separately and never filtered.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset: `warn`, raised by each `-v`.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "assessor=info,warn",
        _ => "assessor=debug,info",
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `verbosity`.
///
/// ```bash
/// RUST_LOG=assessor=debug assessor run --goal Performance ...
/// assessor -vv run --goal Performance ...
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .compact(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_crate_level_only() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "assessor=info,warn");
        assert_eq!(default_directive(5), default_directive(2));
    }
}
