//! TCP Client module
//!
//! One outbound connection, addressed by IPv4 address or hostname, with the same
//! line-oriented send/receive as the server.

use log::{debug, error, info, warn};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};

use crate::config::TcpClientConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Ip(Ipv4Addr),
    /// Resolved through the platform resolver on connect
    Host(String),
}

impl From<Ipv4Addr> for ServerAddress {
    fn from(ip: Ipv4Addr) -> Self {
        ServerAddress::Ip(ip)
    }
}

impl From<&str> for ServerAddress {
    fn from(host: &str) -> Self {
        match host.parse::<Ipv4Addr>() {
            Ok(ip) => ServerAddress::Ip(ip),
            Err(_) => ServerAddress::Host(host.to_string()),
        }
    }
}

impl From<String> for ServerAddress {
    fn from(host: String) -> Self {
        ServerAddress::from(host.as_str())
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Ip(ip) => write!(f, "{}", ip),
            ServerAddress::Host(host) => write!(f, "{}", host),
        }
    }
}

impl ServerAddress {
    fn resolve(&self, port: u16) -> Result<Vec<SocketAddr>> {
        match self {
            ServerAddress::Ip(ip) => Ok(vec![SocketAddr::from((*ip, port))]),
            ServerAddress::Host(host) => {
                let addrs: Vec<SocketAddr> = (host.as_str(), port)
                    .to_socket_addrs()
                    .map_err(|e| Error::TcpError(format!("Failed to resolve {}: {}", host, e)))?
                    .collect();
                if addrs.is_empty() {
                    return Err(Error::TcpError(format!("{} resolved to no addresses", host)));
                }
                debug!("{} resolved to {:?}", host, addrs);
                Ok(addrs)
            }
        }
    }
}

/// TCP Client
pub struct TcpClient {
    config: TcpClientConfig,
    connection: Option<Connection>,
    last_received: String,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new(TcpClientConfig::default())
    }
}

impl TcpClient {
    pub fn new(config: TcpClientConfig) -> Self {
        Self {
            config,
            connection: None,
            last_received: String::new(),
        }
    }

    /// Opens a connection, replacing any existing one.
    ///
    /// Every address a hostname resolves to is tried in turn.
    pub fn connect(&mut self, server: impl Into<ServerAddress>, port: u16) -> Result<()> {
        let server = server.into();
        self.stop_client();

        let mut last_error = None;
        for addr in server.resolve(port)? {
            let attempt = if self.config.connect_timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            };
            match attempt {
                Ok(stream) => {
                    let connection =
                        Connection::new(stream, self.config.max_line_length, self.config.write_timeout)?;
                    info!("Connected to {} ({})", server, addr);
                    self.connection = Some(connection);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connecting to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no address".to_string(), |e| e.to_string());
        Err(Error::TcpError(format!("Failed to connect to {}:{}: {}", server, port, reason)))
    }

    /// Whether the connection is up; a peer that closed counts as disconnected
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().map_or(false, Connection::is_open)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(Connection::peer)
    }

    /// Sends `text` as is; returns the bytes written, 0 when not connected
    pub fn send(&mut self, text: &str) -> usize {
        let Some(connection) = self.connection.as_mut() else {
            debug!("send: not connected");
            return 0;
        };

        match connection.write(text.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                error!("Error sending to {}: {}", connection.peer(), e);
                self.release();
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

    /// Next complete line from the server, empty if there is none yet
    pub fn receive(&mut self) -> String {
        let Some(connection) = self.connection.as_mut() else {
            return String::new();
        };

        let line = connection.poll_line();
        if connection.is_finished() {
            info!("Server {} closed the connection", connection.peer());
            self.release();
        }

        match line {
            Some(line) => {
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

    /// Closes the connection
    pub fn stop_client(&mut self) {
        if let Some(connection) = self.connection.as_ref() {
            info!("Closing connection to {}", connection.peer());
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_str() {
        assert_eq!(ServerAddress::from("10.0.0.7"), ServerAddress::Ip(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(
            ServerAddress::from("example.local"),
            ServerAddress::Host("example.local".to_string())
        );
    }

    #[test]
    fn ip_resolves_without_lookup() {
        let addrs = ServerAddress::Ip(Ipv4Addr::LOCALHOST).resolve(9000).unwrap();
        assert_eq!(addrs, vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 9000))]);
    }

    #[test]
    fn disconnected_client_is_inert() {
        let mut client = TcpClient::default();
        assert!(!client.is_connected());
        assert_eq!(client.send("ping\n"), 0);
        assert_eq!(client.receive(), "");
        assert_eq!(client.peer_addr(), None);
        client.stop_client();
    }
}
