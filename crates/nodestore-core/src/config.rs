//! Store tunables (`spec.md` §6 "Tunables").

use std::time::Duration;

use clap::Args;

/// Store-level tunables, flattened into `nodestore-remote`'s top-level
/// config the way `MuxConfig` declares its own tunable fields.
#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    /// How often the idle sweeper wakes to retire expired nodes, in
    /// milliseconds.
    #[arg(long, default_value_t = 1000, env = "NODESTORE_CLEANER_PERIOD_MS")]
    pub cleaner_period_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { cleaner_period_ms: 1000 }
    }
}

impl StoreConfig {
    pub fn cleaner_period(&self) -> Duration {
        Duration::from_millis(self.cleaner_period_ms)
    }
}
