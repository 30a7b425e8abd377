//! Binary configuration (`spec.md` §6 "Tunables"), clap-derived the way
//! `MuxConfig` declares the teacher binary's tunables.

use std::time::Duration;

use clap::Parser;
use nodestore_core::config::StoreConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "nodestore-remote", about = "Reactive-state runtime remote transport")]
pub struct RemoteConfig {
    /// Bind address for the HTTP/WebSocket listener.
    #[arg(long, default_value = "127.0.0.1", env = "NODESTORE_HOST")]
    pub host: String,

    /// Bind port for the HTTP/WebSocket listener.
    #[arg(long, default_value_t = 8080, env = "NODESTORE_PORT")]
    pub port: u16,

    /// Client reconnect interval, in milliseconds
    /// (`RemoteManager.RECONNECT_TIMEOUT`, default 1.0s).
    #[arg(long, default_value_t = 1000, env = "NODESTORE_RECONNECT_TIMEOUT_MS")]
    pub reconnect_timeout_ms: u64,

    /// Deadline for a PICK/PICKACK round trip, in milliseconds (default
    /// 0.1s).
    #[arg(long, default_value_t = 100, env = "NODESTORE_PICK_DEADLINE_MS")]
    pub pick_deadline_ms: u64,

    #[command(flatten)]
    pub store: StoreConfig,
}

impl RemoteConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    pub fn pick_deadline(&self) -> Duration {
        Duration::from_millis(self.pick_deadline_ms)
    }
}
