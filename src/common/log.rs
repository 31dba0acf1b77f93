//! Logging setup
//!
//! Thin wrapper over `env_logger`. `RUST_LOG` always wins over the configured level.

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Initialize the global logger
///
/// Only the first call has any effect, so tests and embedding harnesses
/// may call it freely.
///
/// # Parameters
///
/// * `level` - Default filter used when `RUST_LOG` is not set
pub fn init_logger(level: &str) {
    LOGGER.get_or_init(|| {
        let env = env_logger::Env::default().filter_or("RUST_LOG", level);
        // Another logger may already be installed by the embedding process.
        let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
    });
}
