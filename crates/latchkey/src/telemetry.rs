//! Tracing subscriber setup for binaries embedding Latchkey.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. With `json`, every
/// event is one JSON object per line.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
