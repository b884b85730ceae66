use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

/// Install the stderr subscriber that carries BlogHub's client logs.
///
/// The gateway emits a `debug` event for every dispatched request (method,
/// path and whether a bearer was attached) and for each 401 that starts a
/// refresh. Session changes such as sign-in, refresh, expiry and sign-out
/// are `info`. Failures the client absorbs instead of returning (logout
/// calls, profile fetches, unreadable credential files) are `warn`. Token
/// values are never recorded.
///
/// Idempotent, so tests and binaries can call it more than once.
pub fn init_tracing(filter: EnvFilter) -> Result<()> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    SUBSCRIBER_GUARD.set(()).ok();

    Ok(())
}

/// Filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}
