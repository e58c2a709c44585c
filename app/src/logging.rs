use color_eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::env_key;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// The filter comes from `STOCKSIM_LOG`, then `RUST_LOG`, then defaults to `info`.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_env(env_key("LOG"))
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init()?;
    Ok(())
}
