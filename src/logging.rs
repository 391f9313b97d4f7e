use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Calling it more than once is a no-op, so tests and demos can both call it.
pub fn init_tracing() {
    if INITIALISED.set(()).is_err() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    // 他のクレートが先にsubscriberを入れていても失敗扱いにしない
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
