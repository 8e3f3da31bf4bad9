use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the host's fmt subscriber, honouring `RUST_LOG` and falling back
/// to `default_filter`. Forwarded worker records flow through the same
/// subscriber via [`crate::forwarder::TracingSink`], so one filter governs
/// host and worker output alike.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("could not install tracing subscriber: {e}"))?;
    Ok(())
}
