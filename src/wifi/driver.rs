//! Platform seam for the WiFi helper.

use crate::error::Result;
use crate::wifi::types::{
    AccessPointConfig, IpInfo, SoftApAddress, StationConfig, WifiMode, WifiStatus,
};

/// Operations the helper needs from a WiFi stack.
///
/// Implementations forward to the platform. Association is asynchronous:
/// `connect_station` only issues the request and `station_status` reports
/// how it went.
pub trait WifiDriver {
    fn mode(&self) -> Result<WifiMode>;

    /// Switches interfaces on and off; `WifiMode::Off` stops the radio
    fn set_mode(&mut self, mode: WifiMode) -> Result<()>;

    fn connect_station(&mut self, station: &StationConfig) -> Result<()>;

    fn disconnect_station(&mut self) -> Result<()>;

    /// Forgets the station credentials persisted by the platform
    fn erase_station_credentials(&mut self) -> Result<()>;

    fn station_status(&self) -> WifiStatus;

    fn station_ip_info(&self) -> Result<IpInfo>;

    fn start_access_point(&mut self, access_point: &AccessPointConfig) -> Result<()>;

    /// Clears the AP configuration without changing the mode
    fn stop_access_point(&mut self) -> Result<()>;

    fn configure_access_point_address(&mut self, address: &SoftApAddress) -> Result<()>;

    /// SSID the soft AP is broadcasting, `None` while it is down
    fn access_point_ssid(&self) -> Result<Option<String>>;

    fn access_point_ip_info(&self) -> Result<IpInfo>;

    fn access_point_mac(&self) -> Result<[u8; 6]>;

    fn access_point_station_count(&self) -> Result<usize>;
}
