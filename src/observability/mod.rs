use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Install the tracing subscriber and announce startup.
///
/// The configured level is the default; `RUST_LOG` wins when set, so
/// operators can raise verbosity per module without touching the service
/// configuration.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage,
        listen_addr = %config.listen_addr,
        "starting gatehouse policy decision point"
    );
}
