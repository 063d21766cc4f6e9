//! TCP Server module
//!
//! A listener that holds at most one client at a time and exchanges text lines
//! with it. Everything is non-blocking and meant to be driven from a poll loop.

use log::{debug, error, info, warn};
use std::io;
use std::net::{Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream};

use crate::config::{SecondClientPolicy, TcpServerConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// TCP Server
///
/// Owns its listening socket from [`start_server`](Self::start_server) until
/// [`stop_server`](Self::stop_server) or drop, and at most one held client.
pub struct TcpServer {
    /// TCP server configuration
    config: TcpServerConfig,
    listener: Option<TcpListener>,
    /// The held client
    client: Option<Connection>,
    last_received: String,
}

impl TcpServer {
    /// Create a new TCP server with the given configuration
    pub fn new(config: TcpServerConfig) -> Self {
        Self {
            config,
            listener: None,
            client: None,
            last_received: String::new(),
        }
    }

    /// Server on `port` with default settings for everything else
    pub fn with_port(port: u16) -> Self {
        Self::new(TcpServerConfig {
            port,
            ..TcpServerConfig::default()
        })
    }

    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// Binds the configured address and starts listening.
    ///
    /// Calling it again drops any held client and rebinds.
    pub fn start_server(&mut self) -> Result<()> {
        self.stop_server();

        let bind_address = SocketAddrV4::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(bind_address)
            .map_err(|e| Error::TcpError(format!("Failed to bind to {}: {}", bind_address, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::TcpError(format!("Failed to set listener to non-blocking mode: {}", e)))?;

        match listener.local_addr() {
            Ok(addr) => info!("TCP server listening on {}", addr),
            Err(_) => info!("TCP server listening on {}", bind_address),
        }
        self.listener = Some(listener);
        Ok(())
    }

    /// Closes the held client and the listener
    pub fn stop_server(&mut self) {
        self.stop_client();
        if self.listener.take().is_some() {
            info!("TCP server on port {} stopped", self.config.port);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Bound address, useful when the configured port is 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Polls for an incoming connection.
    ///
    /// Returns `true` exactly when a new client became the held client. A held
    /// client whose peer has gone away is released first. Connections arriving
    /// while a client is held are handled per [`SecondClientPolicy`].
    pub fn scan_client(&mut self) -> bool {
        if self.listener.is_none() {
            return false;
        }

        if self.client.as_ref().map_or(false, Connection::is_finished) {
            info!("Held client disconnected");
            self.release_client();
        }

        if self.client.is_some() {
            match self.config.second_client {
                SecondClientPolicy::Queue => return false,
                SecondClientPolicy::Refuse => {
                    if let Some((stream, addr)) = self.accept_pending() {
                        warn!("Refusing client {}: already serving {}", addr, self.held_peer_label());
                        let _ = stream.shutdown(Shutdown::Both);
                    }
                    return false;
                }
                SecondClientPolicy::Replace => {}
            }
        }

        let Some((stream, addr)) = self.accept_pending() else {
            return false;
        };

        if self.client.is_some() {
            info!("Client {} replaces {}", addr, self.held_peer_label());
            self.release_client();
        }

        match Connection::new(stream, self.config.max_line_length, self.config.write_timeout) {
            Ok(connection) => {
                info!("New client connected: {}", addr);
                self.client = Some(connection);
                true
            }
            Err(e) => {
                error!("Error setting up client {}: {}", addr, e);
                false
            }
        }
    }

    fn accept_pending(&self) -> Option<(TcpStream, SocketAddr)> {
        let listener = self.listener.as_ref()?;
        match listener.accept() {
            Ok(pending) => Some(pending),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                error!("Connection failed: {}", e);
                None
            }
        }
    }

    fn held_peer_label(&self) -> String {
        self.client
            .as_ref()
            .map(|c| c.peer().to_string())
            .unwrap_or_else(|| "nobody".to_string())
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Whether the held client's connection is still up
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().map_or(false, Connection::is_open)
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client.as_ref().map(Connection::peer)
    }

    /// Sends `text` as is to the held client.
    ///
    /// Returns the bytes written, 0 when no client is held or the write failed
    /// (which also releases the client).
    pub fn send(&mut self, text: &str) -> usize {
        let Some(client) = self.client.as_mut() else {
            debug!("send: no client connected");
            return 0;
        };

        match client.write(text.as_bytes()) {
            Ok(n) => {
                debug!("TCP -> {}: {} bytes", client.peer(), n);
                n
            }
            Err(e) => {
                error!("Error sending to client {}: {}", client.peer(), e);
                self.release_client();
                0
            }
        }
    }

    /// Sends `text` followed by `\n`
    pub fn send_line(&mut self, text: &str) -> usize {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.send(&line)
    }

    /// Next complete line from the held client, empty if there is none yet
    pub fn receive(&mut self) -> String {
        let Some(client) = self.client.as_mut() else {
            return String::new();
        };

        let line = client.poll_line();
        if client.is_finished() {
            info!("Client {} disconnected", client.peer());
            self.release_client();
        }

        match line {
            Some(line) => {
                debug!("Received line of {} bytes", line.len());
                self.last_received.clone_from(&line);
                line
            }
            None => String::new(),
        }
    }

    /// Most recent line returned by `receive`
    pub fn last_received(&self) -> &str {
        &self.last_received
    }

    /// Closes the held client; the server keeps listening
    pub fn stop_client(&mut self) {
        if let Some(client) = self.client.as_ref() {
            info!("Closing client {}", client.peer());
        }
        self.release_client();
    }

    fn release_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close();
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop_server();
    }
}
