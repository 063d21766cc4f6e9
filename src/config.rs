use std::net::Ipv4Addr;
use std::time::Duration;

use heapless::String;

use crate::wifi::{
    AccessPointConfig, AuthMethod, Cipher, ShortPassphrasePolicy, SoftApAddress, StationConfig,
};

/// Station credentials baked in at build time, e.g. `WIFI_SSID=home cargo build`
const STATION_SSID: Option<&str> = option_env!("WIFI_SSID");
const STATION_PASSWORD: Option<&str> = option_env!("WIFI_PASS");

/// WiFi configuration
#[derive(Debug, Clone)]
pub struct WiFiConfig {
    /// Network to join in station mode
    pub station: StationConfig,
    /// Soft access point started next to the station
    pub access_point: AccessPointConfig,
    /// Soft AP addressing; the platform default (192.168.4.1/24) when `None`
    pub soft_ap_address: Option<SoftApAddress>,
}

impl Default for WiFiConfig {
    fn default() -> Self {
        Self {
            station: StationConfig {
                ssid: String::try_from(STATION_SSID.unwrap_or("your_wifi_ssid")).unwrap_or_default(),
                passphrase: String::try_from(STATION_PASSWORD.unwrap_or("your_wifi_password"))
                    .ok()
                    .filter(|p| !p.is_empty()),
                address: None,
            },
            access_point: AccessPointConfig {
                ssid: String::try_from("ESP32-AP").unwrap_or_default(),
                passphrase: String::try_from("password123").ok(),
                channel: 1,
                hidden: false,
                max_connections: 4,
                ftm_responder: false,
                auth_method: AuthMethod::default(),
                cipher: Cipher::default(),
                short_passphrase: ShortPassphrasePolicy::default(),
            },
            soft_ap_address: None,
        }
    }
}

/// What the server does with a connection arriving while it already holds a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondClientPolicy {
    /// Leave it waiting in the listen backlog until the held client goes away
    #[default]
    Queue,
    /// Accept and immediately close it
    Refuse,
    /// Close the held client and hold the new one
    Replace,
}

/// TCP server configuration
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// Bind address for the TCP server
    pub bind_address: Ipv4Addr,
    /// Port for the TCP server
    pub port: u16,
    /// Handling of connections beyond the held client
    pub second_client: SecondClientPolicy,
    /// Longest line returned by `receive` before unterminated data is split
    pub max_line_length: usize,
    /// Upper bound for `send` while the socket buffer is full
    pub write_timeout: Duration,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            port: 80,
            second_client: SecondClientPolicy::default(),
            max_line_length: 1024,
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// TCP client configuration
#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    /// Per-address limit for establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound for `send` while the socket buffer is full
    pub write_timeout: Duration,
    /// Longest line returned by `receive` before unterminated data is split
    pub max_line_length: usize,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            max_line_length: 1024,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WiFi configuration
    pub wifi: WiFiConfig,
    /// TCP server configuration
    pub tcp_server: TcpServerConfig,
    /// TCP client configuration
    pub tcp_client: TcpClientConfig,
    /// Sleep between iterations of the control loop in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wifi: WiFiConfig::default(),
            tcp_server: TcpServerConfig {
                port: 8080,
                ..TcpServerConfig::default()
            },
            tcp_client: TcpClientConfig::default(),
            poll_interval_ms: 10,
        }
    }
}

/// Create a new application configuration with default values
pub fn create_config() -> AppConfig {
    AppConfig::default()
}
