//! Console logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise the configured level applies to
//! both ledger crates and everything else stays at `warn`.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Returns `false` if one was
/// already installed, which is harmless.
pub fn init(log_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level))
        .with_target(true)
        .try_init()
        .is_ok()
}

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = format!("warn,ledger_kernel={log_level},ledger_runtime={log_level},ledgerctl={log_level}");
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}
