//! Subscriber bootstrap for binaries. The library itself only emits
//! `tracing` events; it never installs a subscriber.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, with `twinlink=info` as
/// the baseline. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("twinlink=info".parse()?);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
