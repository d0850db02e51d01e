//! Logging setup
//!
//! The libraries log through the `log` facade; the subscriber installed here
//! picks those records up through its `log` bridge.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging. `RUST_LOG` wins over the verbosity flag when set.
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(verbose >= 2).with_writer(std::io::stderr))
        .try_init();
}
