//! WiFi module
//!
//! Station and soft AP configuration on top of a [`WifiDriver`]. The helper keeps
//! the credentials and addressing handed to it and forwards everything else to
//! the platform, which owns the actual connection state.

pub mod addr;
pub mod driver;
#[cfg(target_os = "espidf")]
pub mod esp;
pub mod types;

use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};

pub use driver::WifiDriver;
#[cfg(target_os = "espidf")]
pub use esp::EspWifiDriver;
pub use types::{
    AccessPointConfig, AuthMethod, Cipher, DisconnectOptions, IpInfo, ShortPassphrasePolicy,
    SoftApAddress, StaticAddress, StationConfig, WifiMode, WifiStatus,
};

/// Interval between link checks while `disconnect` waits
const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WiFi helper
///
/// Holds station credentials and static addressing until they are used by
/// [`connect_wifi`](Self::connect_wifi), and tracks whether a soft AP was created.
pub struct WifiHelper<D: WifiDriver> {
    driver: D,
    /// Credentials of the last `begin`
    station: Option<StationConfig>,
    /// Static addressing applied on the next connect; DHCP when `None`
    address: Option<StaticAddress>,
    ap_created: bool,
}

impl<D: WifiDriver> WifiHelper<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            station: None,
            address: None,
            ap_created: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn is_ap_created(&self) -> bool {
        self.ap_created
    }

    /// Stores the station parameters and starts connecting.
    ///
    /// Association completes in the background; the returned status is the
    /// platform state right after the request was issued.
    pub fn begin(&mut self, station: StationConfig) -> Result<WifiStatus> {
        if let Some(address) = station.address {
            address.validate()?;
            self.address = Some(address);
        }
        self.station = Some(StationConfig {
            address: None,
            ..station
        });
        self.connect_wifi()
    }

    /// Sets static addressing for the next connect.
    ///
    /// Returns `false` without changing anything while the station is connected,
    /// since DHCP or static addressing is fixed when the link comes up.
    pub fn config(&mut self, address: StaticAddress) -> Result<bool> {
        address.validate()?;
        if self.is_connected() {
            warn!("Ignoring static address {}: station already connected", address.ip);
            return Ok(false);
        }
        debug!("Static address {} stored for next connect", address.ip);
        self.address = Some(address);
        Ok(true)
    }

    /// Switches back to DHCP for the next connect
    pub fn clear_config(&mut self) {
        self.address = None;
    }

    pub fn is_connected(&self) -> bool {
        self.driver.station_status().is_connected()
    }

    pub fn status(&self) -> WifiStatus {
        self.driver.station_status()
    }

    /// Connects with the stored credentials and addressing
    pub fn connect_wifi(&mut self) -> Result<WifiStatus> {
        let mut station = self
            .station
            .clone()
            .ok_or_else(|| Error::WiFiError("no station credentials configured".to_string()))?;
        station.address = self.address;

        let mode = self.driver.mode()?;
        if !mode.has_station() {
            self.driver.set_mode(mode.with_station(true))?;
        }

        info!(
            "Connecting to WiFi SSID '{}' ({})",
            station.ssid,
            if station.address.is_some() { "static" } else { "DHCP" }
        );
        self.driver.connect_station(&station)?;

        let status = self.driver.station_status();
        debug!("Station status after connect request: {:?}", status);
        Ok(status)
    }

    /// Tears down the station link.
    ///
    /// With a zero timeout this returns `true` once the request is issued. Otherwise
    /// it waits up to the timeout and returns whether the link went down.
    pub fn disconnect(&mut self, options: DisconnectOptions) -> Result<bool> {
        self.driver.disconnect_station()?;
        info!("WiFi station disconnect requested");

        if options.erase_credentials {
            self.driver.erase_station_credentials()?;
            self.station = None;
            info!("Stored station credentials erased");
        }

        if options.wifi_off {
            let mode = self.driver.mode()?;
            if mode.has_station() {
                self.driver.set_mode(mode.with_station(false))?;
            }
        }

        if options.timeout.is_zero() {
            return Ok(true);
        }

        let started = Instant::now();
        while self.is_connected() {
            if started.elapsed() >= options.timeout {
                warn!("Station still connected after {:?}", options.timeout);
                return Ok(false);
            }
            thread::sleep(DISCONNECT_POLL_INTERVAL);
        }
        Ok(true)
    }

    fn station_ip_info(&self) -> IpInfo {
        if !self.is_connected() {
            return IpInfo::UNASSIGNED;
        }
        self.driver.station_ip_info().unwrap_or_else(|e| {
            warn!("Failed to read station address: {}", e);
            IpInfo::UNASSIGNED
        })
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.station_ip_info().ip
    }

    pub fn subnet_mask(&self) -> Ipv4Addr {
        self.station_ip_info().subnet_mask
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.station_ip_info().gateway
    }

    /// DNS server 0 or 1; `0.0.0.0` when unset
    pub fn dns_ip(&self, index: usize) -> Ipv4Addr {
        let info = self.station_ip_info();
        let dns = match index {
            0 => info.dns1,
            1 => info.dns2,
            _ => None,
        };
        dns.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    pub fn mode(&self) -> Result<WifiMode> {
        self.driver.mode()
    }

    pub fn set_mode(&mut self, mode: WifiMode) -> Result<()> {
        self.driver.set_mode(mode)?;
        if !mode.has_access_point() {
            self.ap_created = false;
        }
        info!("WiFi mode set to {:?}", mode);
        Ok(())
    }

    /// Starts the soft AP, keeping the station interface as it was
    pub fn create_ap(&mut self, access_point: &AccessPointConfig) -> Result<()> {
        let effective = access_point.effective()?;

        let mode = self.driver.mode()?;
        if !mode.has_access_point() {
            self.driver.set_mode(mode.with_access_point(true))?;
        }

        self.driver.start_access_point(&effective)?;
        self.ap_created = true;

        info!(
            "Soft AP '{}' started on channel {} ({}, max {} stations)",
            effective.ssid,
            effective.channel,
            if effective.is_open() { "open" } else { "secured" },
            effective.max_connections
        );
        Ok(())
    }

    pub fn soft_ap_config(&mut self, address: &SoftApAddress) -> Result<()> {
        let resolved = address.resolve()?;

        let mode = self.driver.mode()?;
        if !mode.has_access_point() {
            self.driver.set_mode(mode.with_access_point(true))?;
        }

        self.driver.configure_access_point_address(&resolved)?;
        info!(
            "Soft AP address {} / {}, leases from {}",
            resolved.local_ip,
            resolved.subnet_mask,
            resolved.dhcp_lease_start.unwrap_or(Ipv4Addr::UNSPECIFIED)
        );
        Ok(())
    }

    fn access_point_up(&self) -> bool {
        self.driver
            .mode()
            .map(WifiMode::has_access_point)
            .unwrap_or(false)
    }

    fn access_point_ip_info(&self) -> IpInfo {
        if !self.access_point_up() {
            return IpInfo::UNASSIGNED;
        }
        self.driver.access_point_ip_info().unwrap_or_else(|e| {
            warn!("Failed to read soft AP address: {}", e);
            IpInfo::UNASSIGNED
        })
    }

    /// Broadcast SSID, empty while the AP is down
    pub fn soft_ap_ssid(&self) -> String {
        if !self.access_point_up() {
            return String::new();
        }
        match self.driver.access_point_ssid() {
            Ok(ssid) => ssid.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read soft AP SSID: {}", e);
                String::new()
            }
        }
    }

    pub fn soft_ap_ip(&self) -> Ipv4Addr {
        self.access_point_ip_info().ip
    }

    pub fn soft_ap_subnet_mask(&self) -> Ipv4Addr {
        self.access_point_ip_info().subnet_mask
    }

    pub fn soft_ap_broadcast_ip(&self) -> Ipv4Addr {
        let info = self.access_point_ip_info();
        if info.ip.is_unspecified() {
            return Ipv4Addr::UNSPECIFIED;
        }
        addr::broadcast(info.ip, info.subnet_mask)
    }

    pub fn soft_ap_network_id(&self) -> Ipv4Addr {
        let info = self.access_point_ip_info();
        addr::network_id(info.ip, info.subnet_mask)
    }

    pub fn soft_ap_subnet_cidr(&self) -> u8 {
        addr::prefix_len(self.access_point_ip_info().subnet_mask).unwrap_or(0)
    }

    /// MAC of the AP interface, e.g. `24:0A:C4:00:01:02`; empty on failure
    pub fn soft_ap_mac_address(&self) -> String {
        match self.driver.access_point_mac() {
            Ok(mac) => addr::format_mac(&mac),
            Err(e) => {
                warn!("Failed to read soft AP MAC: {}", e);
                String::new()
            }
        }
    }

    pub fn soft_ap_station_count(&self) -> usize {
        if !self.access_point_up() {
            return 0;
        }
        self.driver.access_point_station_count().unwrap_or(0)
    }

    /// Stops the soft AP; `wifi_off` also switches the AP interface off
    pub fn soft_ap_disconnect(&mut self, wifi_off: bool) -> Result<()> {
        self.driver.stop_access_point()?;
        self.ap_created = false;
        info!("Soft AP stopped");

        if wifi_off {
            let mode = self.driver.mode()?;
            if mode.has_access_point() {
                self.driver.set_mode(mode.with_access_point(false))?;
            }
        }
        Ok(())
    }
}
