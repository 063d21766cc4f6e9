//! Value types shared by the WiFi helper and its drivers.

use std::net::Ipv4Addr;
use std::time::Duration;

use heapless::String;
use log::warn;

use crate::error::{Error, Result};
use crate::wifi::addr;

/// Longest SSID the radio accepts, in bytes
pub const MAX_SSID_LEN: usize = 32;
/// Longest passphrase the radio accepts, in bytes
pub const MAX_PASSPHRASE_LEN: usize = 64;
/// Shortest WPA passphrase the radio accepts
pub const MIN_PASSPHRASE_LEN: usize = 8;
/// Hard limit on stations connected to the soft AP
pub const MAX_AP_CONNECTIONS: u8 = 10;

/// Station connection state, numbered like the platform's `wl_status_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WifiStatus {
    Idle = 0,
    NoSsidAvail = 1,
    ScanCompleted = 2,
    Connected = 3,
    ConnectFailed = 4,
    ConnectionLost = 5,
    Disconnected = 6,
    NoShield = 255,
}

impl WifiStatus {
    /// Platform integer for this status
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_connected(self) -> bool {
        self == WifiStatus::Connected
    }
}

impl From<WifiStatus> for i32 {
    fn from(status: WifiStatus) -> Self {
        i32::from(status.code())
    }
}

/// Radio operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WifiMode {
    #[default]
    Off,
    Station,
    AccessPoint,
    Mixed,
}

impl WifiMode {
    pub fn from_parts(station: bool, access_point: bool) -> Self {
        match (station, access_point) {
            (false, false) => WifiMode::Off,
            (true, false) => WifiMode::Station,
            (false, true) => WifiMode::AccessPoint,
            (true, true) => WifiMode::Mixed,
        }
    }

    pub fn has_station(self) -> bool {
        matches!(self, WifiMode::Station | WifiMode::Mixed)
    }

    pub fn has_access_point(self) -> bool {
        matches!(self, WifiMode::AccessPoint | WifiMode::Mixed)
    }

    /// Same mode with the station interface switched on or off
    pub fn with_station(self, enabled: bool) -> Self {
        Self::from_parts(enabled, self.has_access_point())
    }

    /// Same mode with the access point interface switched on or off
    pub fn with_access_point(self, enabled: bool) -> Self {
        Self::from_parts(self.has_station(), enabled)
    }
}

/// Authentication mode of the soft AP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthMethod {
    None,
    Wep,
    WpaPersonal,
    #[default]
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa3Personal,
    Wpa2Wpa3Personal,
}

/// Pairwise cipher of the soft AP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cipher {
    None,
    Wep40,
    Wep104,
    Tkip,
    #[default]
    Ccmp,
    TkipCcmp,
    Gcmp,
}

/// What `create_ap` does with a passphrase shorter than the platform minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShortPassphrasePolicy {
    /// Fail with [`Error::InvalidConfig`]
    #[default]
    Reject,
    /// Drop the passphrase and start an open network
    Open,
}

/// Addressing of one interface as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns1: Option<Ipv4Addr>,
    pub dns2: Option<Ipv4Addr>,
}

impl IpInfo {
    /// All-zero addressing, reported while an interface is down
    pub const UNASSIGNED: IpInfo = IpInfo {
        ip: Ipv4Addr::UNSPECIFIED,
        subnet_mask: Ipv4Addr::UNSPECIFIED,
        gateway: Ipv4Addr::UNSPECIFIED,
        dns1: None,
        dns2: None,
    };
}

/// Static station addressing; without one the station uses DHCP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddress {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub dns1: Option<Ipv4Addr>,
    pub dns2: Option<Ipv4Addr>,
}

impl StaticAddress {
    pub fn new(
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        subnet_mask: Ipv4Addr,
        dns1: Option<Ipv4Addr>,
        dns2: Option<Ipv4Addr>,
    ) -> Self {
        Self { ip, gateway, subnet_mask, dns1, dns2 }
    }

    /// Address plus DNS only: the gateway is `a.b.c.1` and the mask `/24`
    pub fn with_dns(ip: Ipv4Addr, dns: Ipv4Addr) -> Self {
        Self {
            ip,
            gateway: addr::default_gateway(ip),
            subnet_mask: addr::mask_from_prefix(24),
            dns1: Some(dns),
            dns2: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if addr::prefix_len(self.subnet_mask).is_none() {
            return Err(Error::InvalidConfig(format!(
                "subnet mask {} is not contiguous",
                self.subnet_mask
            )));
        }
        if self.ip.is_unspecified() {
            return Err(Error::InvalidConfig("static IP must not be 0.0.0.0".to_string()));
        }
        Ok(())
    }
}

/// Station connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub ssid: String<MAX_SSID_LEN>,
    /// `None` joins an open network
    pub passphrase: Option<String<MAX_PASSPHRASE_LEN>>,
    /// `None` uses DHCP
    pub address: Option<StaticAddress>,
}

impl StationConfig {
    pub fn new(ssid: &str) -> Result<Self> {
        Ok(Self {
            ssid: ssid_from(ssid)?,
            passphrase: None,
            address: None,
        })
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Result<Self> {
        self.passphrase = passphrase_from(passphrase)?;
        Ok(self)
    }

    pub fn with_address(mut self, address: StaticAddress) -> Self {
        self.address = Some(address);
        self
    }
}

/// Soft access point parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String<MAX_SSID_LEN>,
    pub passphrase: Option<String<MAX_PASSPHRASE_LEN>>,
    pub channel: u8,
    pub hidden: bool,
    pub max_connections: u8,
    pub ftm_responder: bool,
    pub auth_method: AuthMethod,
    pub cipher: Cipher,
    pub short_passphrase: ShortPassphrasePolicy,
}

impl AccessPointConfig {
    /// Open AP on channel 1 allowing 4 stations, WPA2-PSK/CCMP once a passphrase is set
    pub fn new(ssid: &str) -> Result<Self> {
        Ok(Self {
            ssid: ssid_from(ssid)?,
            passphrase: None,
            channel: 1,
            hidden: false,
            max_connections: 4,
            ftm_responder: false,
            auth_method: AuthMethod::default(),
            cipher: Cipher::default(),
            short_passphrase: ShortPassphrasePolicy::default(),
        })
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Result<Self> {
        self.passphrase = passphrase_from(passphrase)?;
        Ok(self)
    }

    /// Whether stations can join without a passphrase
    pub fn is_open(&self) -> bool {
        self.passphrase.is_none() || self.auth_method == AuthMethod::None
    }

    /// Validates the parameters and returns what the radio should actually run.
    ///
    /// A missing passphrase turns authentication off. A passphrase below
    /// [`MIN_PASSPHRASE_LEN`] is handled per [`ShortPassphrasePolicy`].
    pub fn effective(&self) -> Result<AccessPointConfig> {
        if self.ssid.is_empty() {
            return Err(Error::InvalidConfig("AP SSID must not be empty".to_string()));
        }
        if !(1..=14).contains(&self.channel) {
            return Err(Error::InvalidConfig(format!("invalid AP channel {}", self.channel)));
        }
        if !(1..=MAX_AP_CONNECTIONS).contains(&self.max_connections) {
            return Err(Error::InvalidConfig(format!(
                "max connections must be within 1..={}, got {}",
                MAX_AP_CONNECTIONS, self.max_connections
            )));
        }

        let mut effective = self.clone();
        match &self.passphrase {
            Some(pass) if pass.len() < MIN_PASSPHRASE_LEN => match self.short_passphrase {
                ShortPassphrasePolicy::Reject => {
                    return Err(Error::InvalidConfig(format!(
                        "AP passphrase too short ({} < {})",
                        pass.len(),
                        MIN_PASSPHRASE_LEN
                    )));
                }
                ShortPassphrasePolicy::Open => {
                    warn!("AP passphrase shorter than {} characters, starting an open network", MIN_PASSPHRASE_LEN);
                    effective.passphrase = None;
                }
            },
            _ => {}
        }

        if effective.passphrase.is_none() {
            effective.auth_method = AuthMethod::None;
            effective.cipher = Cipher::None;
        } else if effective.auth_method == AuthMethod::None {
            effective.passphrase = None;
            effective.cipher = Cipher::None;
        }

        Ok(effective)
    }
}

/// Soft AP addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftApAddress {
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    /// First address handed out by the DHCP server; `local_ip + 1` when unset
    pub dhcp_lease_start: Option<Ipv4Addr>,
    pub dns: Option<Ipv4Addr>,
}

impl SoftApAddress {
    pub fn new(local_ip: Ipv4Addr, gateway: Ipv4Addr, subnet_mask: Ipv4Addr) -> Self {
        Self {
            local_ip,
            gateway,
            subnet_mask,
            dhcp_lease_start: None,
            dns: None,
        }
    }

    /// Checks the block for consistency and fills in the lease start
    pub fn resolve(&self) -> Result<SoftApAddress> {
        if addr::prefix_len(self.subnet_mask).is_none() {
            return Err(Error::InvalidConfig(format!(
                "subnet mask {} is not contiguous",
                self.subnet_mask
            )));
        }
        if !addr::same_subnet(self.local_ip, self.gateway, self.subnet_mask) {
            return Err(Error::InvalidConfig(format!(
                "gateway {} is outside {}/{}",
                self.gateway, self.local_ip, self.subnet_mask
            )));
        }

        let lease_start = match self.dhcp_lease_start {
            Some(start) => start,
            None => addr::next_address(self.local_ip).ok_or_else(|| {
                Error::InvalidConfig(format!("no lease range after {}", self.local_ip))
            })?,
        };
        if lease_start == self.local_ip {
            return Err(Error::InvalidConfig("DHCP lease start equals the AP address".to_string()));
        }
        if !addr::same_subnet(self.local_ip, lease_start, self.subnet_mask) {
            return Err(Error::InvalidConfig(format!(
                "DHCP lease start {} is outside {}/{}",
                lease_start, self.local_ip, self.subnet_mask
            )));
        }

        Ok(SoftApAddress {
            dhcp_lease_start: Some(lease_start),
            ..*self
        })
    }
}

/// Options for [`WifiHelper::disconnect`](crate::wifi::WifiHelper::disconnect)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectOptions {
    /// Also switch the station interface off
    pub wifi_off: bool,
    /// Forget the stored station credentials
    pub erase_credentials: bool,
    /// Wait up to this long for the link to go down; zero returns immediately
    pub timeout: Duration,
}

fn ssid_from(ssid: &str) -> Result<String<MAX_SSID_LEN>> {
    if ssid.is_empty() {
        return Err(Error::InvalidConfig("SSID must not be empty".to_string()));
    }
    String::try_from(ssid).map_err(|_| {
        Error::InvalidConfig(format!("SSID longer than {} bytes", MAX_SSID_LEN))
    })
}

fn passphrase_from(passphrase: &str) -> Result<Option<String<MAX_PASSPHRASE_LEN>>> {
    if passphrase.is_empty() {
        return Ok(None);
    }
    String::try_from(passphrase).map(Some).map_err(|_| {
        Error::InvalidConfig(format!("passphrase longer than {} bytes", MAX_PASSPHRASE_LEN))
    })
}
