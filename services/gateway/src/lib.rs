//! Order book stream gateway
//!
//! HTTP and WebSocket front end over the symbol book cache: clients register
//! for a session id, attach a WebSocket to it and pick one symbol to watch.
//! Every newly published book for that symbol is pushed to them, latest
//! state first and never a backlog.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod router;
pub mod session;
pub mod state;
pub mod transport;

pub use config::GatewayConfig;
pub use router::create_router;
pub use state::AppState;
