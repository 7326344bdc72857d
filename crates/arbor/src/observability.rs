//! Tracing setup for binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Debug)]
pub struct ObservabilityOptions {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Write through the test writer so output is captured per test.
    pub test_writer: bool,
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            default_filter: "arbor=info".to_string(),
            test_writer: false,
        }
    }
}

/// Install the global subscriber. Later calls are reported and ignored.
pub fn init(options: ObservabilityOptions) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| options.default_filter.clone().into());

    let result = if options.test_writer {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing init failed: {err}");
    }
}
