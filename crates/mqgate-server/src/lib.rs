//! mqgate-server - MQTT v5 broker front end.
//!
//! Accepts TCP connections, decodes MQTT v5 control packets, and emits
//! the matching acknowledgements. Each connection runs on its own OS
//! thread; packet types beyond the CONNECT/PUBLISH core close the
//! connection with a reason-coded DISCONNECT.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{listen_and_serve, Server};
