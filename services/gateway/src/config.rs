//! Gateway configuration
//!
//! Every option can come from the command line or a `BOOKSTREAM_*`
//! environment variable. `Default` mirrors the CLI defaults so tests can
//! build a config without parsing arguments.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use types::errors::StreamError;
use types::symbol::Symbol;

pub const DEFAULT_BIND: &str = "0.0.0.0:8989";
pub const DEFAULT_ATTACH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 8;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = market_data::DEFAULT_MAX_DEPTH;
pub const DEFAULT_AUDIT_QUEUE: usize = 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", version, about = "Real-time order book stream gateway")]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket server listens on
    #[arg(long, env = "BOOKSTREAM_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Seconds a registered session may stay unattached before it is reaped
    #[arg(long, env = "BOOKSTREAM_ATTACH_TIMEOUT_SECS", default_value_t = DEFAULT_ATTACH_TIMEOUT_SECS)]
    pub attach_timeout_secs: u64,

    /// Seconds between sweeps for unattached sessions
    #[arg(long, env = "BOOKSTREAM_REAP_INTERVAL_SECS", default_value_t = DEFAULT_REAP_INTERVAL_SECS)]
    pub reap_interval_secs: u64,

    /// Send a non-fatal "no data yet" frame if a subscription sees no book within this many ms
    #[arg(long, env = "BOOKSTREAM_SNAPSHOT_TIMEOUT_MS")]
    pub snapshot_timeout_ms: Option<u64>,

    /// Outbound frames buffered per session before the oldest is dropped
    #[arg(long, env = "BOOKSTREAM_OUTBOX_CAPACITY", default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    /// Close a session whose socket does not accept a frame within this many ms
    #[arg(long, env = "BOOKSTREAM_WRITE_TIMEOUT_MS", default_value_t = DEFAULT_WRITE_TIMEOUT_MS)]
    pub write_timeout_ms: u64,

    /// Price levels published per book side
    #[arg(long, env = "BOOKSTREAM_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Restrict subscriptions to these symbols (comma separated); empty allows any valid symbol
    #[arg(long = "allow-symbol", env = "BOOKSTREAM_ALLOWED_SYMBOLS", value_delimiter = ',')]
    pub allowed_symbols: Vec<String>,

    /// JSON-lines journal of book updates to replay as the upstream feed
    #[arg(long, env = "BOOKSTREAM_REPLAY_FILE")]
    pub replay_file: Option<PathBuf>,

    /// Delay between replayed updates in ms
    #[arg(long, env = "BOOKSTREAM_REPLAY_INTERVAL_MS")]
    pub replay_interval_ms: Option<u64>,

    /// Append session lifecycle events to this file
    #[arg(long, env = "BOOKSTREAM_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Allowed CORS origins (comma separated); empty means permissive
    #[arg(long = "cors-origin", env = "BOOKSTREAM_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

impl GatewayConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    pub fn snapshot_timeout(&self) -> Option<Duration> {
        self.snapshot_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn replay_pace(&self) -> Option<Duration> {
        self.replay_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Normalized subscription allowlist, `None` when unrestricted.
    pub fn allowlist(&self) -> Result<Option<BTreeSet<Symbol>>, StreamError> {
        let symbols = self
            .allowed_symbols
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(Symbol::parse)
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(if symbols.is_empty() { None } else { Some(symbols) })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8989)),
            attach_timeout_secs: DEFAULT_ATTACH_TIMEOUT_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            snapshot_timeout_ms: None,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            max_depth: DEFAULT_MAX_DEPTH,
            allowed_symbols: Vec::new(),
            replay_file: None,
            replay_interval_ms: None,
            audit_log: None,
            cors_origins: Vec::new(),
        }
    }
}
