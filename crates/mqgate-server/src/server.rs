//! TCP listener and connection spawning.
//!
//! The listener accepts forever; every accepted stream gets its own
//! named OS thread running the connection state machine to completion.
//! Connections share no mutable state.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};

use mqgate_core::{Error, Result};

use crate::config::Config;
use crate::connection::Connection;

/// MQTT broker server.
pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
}

impl Server {
    /// Bind the listener at the configured address.
    pub fn bind(config: Arc<Config>) -> Result<Self> {
        let listener = TcpListener::bind(config.server.bind)?;
        info!("mqgate listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// The actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process exits.
    pub fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.spawn_connection(stream, addr),
                Err(e) => warn!("accept failed: {}", e),
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let config = Arc::clone(&self.config);

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                debug!("accepted connection from {}", addr);
                match Connection::new(stream, addr, config).run() {
                    Ok(()) => debug!("connection from {} closed", addr),
                    Err(Error::Io(e)) => {
                        debug!("connection from {} dropped: {}", addr, e)
                    }
                    Err(e) => debug!("connection from {} closed: {}", addr, e),
                }
            });

        if let Err(e) = spawned {
            error!("failed to spawn connection thread for {}: {}", addr, e);
        }
    }
}

/// Bind and serve at `addr` with default configuration. Does not return
/// except on a bind failure.
pub fn listen_and_serve(addr: SocketAddr) -> Result<()> {
    let mut config = Config::default();
    config.server.bind = addr;
    Server::bind(Arc::new(config))?.run()
}
