pub mod terrain;
mod utils;

pub use terrain::*;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Install a stdout `FmtSubscriber` as the global tracing subscriber.
///
/// Returns `false` if another subscriber was already installed.
pub fn install_default_subscriber(level: Level) -> bool {
    // a builder for `FmtSubscriber`.
    let subscriber = FmtSubscriber::builder()
        // events at `level` and above are written to stdout.
        .with_max_level(level)
        .with_thread_names(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    info!("terrain logging enabled at {}", level);
    true
}
