//! Logging setup
//!
//! Installs a global `tracing` subscriber. The default level is INFO and
//! `RUST_LOG` directives take precedence, e.g.
//!
//! ```bash
//! RUST_LOG=lensmap_camera_models=debug cargo test
//! ```

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Installs the subscriber at INFO level.
///
/// # Example
/// ```no_run
/// lensmap::init_logger();
/// tracing::info!("camera views ready");
/// ```
pub fn init_logger() -> bool {
    init_logger_with_level(Level::INFO)
}

/// Installs the subscriber with `default_level` for targets `RUST_LOG` does
/// not mention.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the call has no effect.
pub fn init_logger_with_level(default_level: Level) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_timer(SystemTime)
        .with_target(true)
        .try_init()
        .is_ok()
}
