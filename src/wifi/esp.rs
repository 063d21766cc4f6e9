//! ESP-IDF backend for the WiFi helper, on top of `esp_idf_svc::wifi::EspWifi`.

use std::sync::{Arc, Mutex};

use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::{modem::Modem, peripheral::Peripheral},
    ipv4::{
        ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
        Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet,
    },
    netif::{EspNetif, NetifConfiguration},
    nvs::EspDefaultNvsPartition,
    sys::{esp, esp_wifi_ap_get_sta_list, wifi_sta_list_t},
    wifi::{
        AccessPointConfiguration, AuthMethod as EspAuthMethod, ClientConfiguration, Configuration,
        EspWifi, WifiEvent,
    },
};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::wifi::addr;
use crate::wifi::driver::WifiDriver;
use crate::wifi::types::{
    AccessPointConfig, AuthMethod, Cipher, IpInfo, SoftApAddress, StationConfig, WifiMode,
    WifiStatus,
};

// Disconnect reasons from `wifi_err_reason_t`
const REASON_AUTH_EXPIRE: u16 = 2;
const REASON_ASSOC_LEAVE: u16 = 8;
const REASON_4WAY_HANDSHAKE_TIMEOUT: u16 = 15;
const REASON_NO_AP_FOUND: u16 = 201;
const REASON_AUTH_FAIL: u16 = 202;
const REASON_ASSOC_FAIL: u16 = 203;
const REASON_HANDSHAKE_TIMEOUT: u16 = 204;

/// WiFi driver backed by the ESP-IDF WiFi stack.
///
/// Station and AP settings are kept separately and pushed to the radio as a
/// single `Configuration` matching the current mode.
pub struct EspWifiDriver {
    wifi: Box<EspWifi<'static>>,
    mode: WifiMode,
    client: ClientConfiguration,
    access_point: AccessPointConfiguration,
    /// Last station state reported by the event loop
    status: Arc<Mutex<WifiStatus>>,
    static_sta: bool,
    _subscription: EspSubscription<'static, System>,
}

impl EspWifiDriver {
    pub fn new(
        modem: impl Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self> {
        let wifi = Box::new(EspWifi::new(modem, sysloop.clone(), nvs)?);

        let status = Arc::new(Mutex::new(WifiStatus::Idle));
        let events = Arc::clone(&status);
        let subscription = sysloop.subscribe::<WifiEvent, _>(move |event| {
            let Ok(mut status) = events.lock() else {
                return;
            };
            match event {
                WifiEvent::StaStarted => *status = WifiStatus::Idle,
                WifiEvent::StaStopped => *status = WifiStatus::Disconnected,
                WifiEvent::StaConnected(_) => *status = WifiStatus::Connected,
                WifiEvent::StaDisconnected(info) => {
                    *status = disconnect_status(info.reason(), *status);
                    debug!("Station disconnected, reason {} -> {:?}", info.reason(), *status);
                }
                _ => {}
            }
        })?;

        info!("ESP WiFi driver created");

        Ok(Self {
            wifi,
            mode: WifiMode::Off,
            client: ClientConfiguration::default(),
            access_point: AccessPointConfiguration::default(),
            status,
            static_sta: false,
            _subscription: subscription,
        })
    }

    fn set_status(&self, value: WifiStatus) {
        if let Ok(mut status) = self.status.lock() {
            *status = value;
        }
    }

    /// Pushes the stored settings to the radio and starts or stops it
    fn apply(&mut self) -> Result<()> {
        let conf = match self.mode {
            WifiMode::Off => {
                if self.wifi.is_started()? {
                    self.wifi.stop()?;
                    info!("WiFi stopped");
                }
                return Ok(());
            }
            WifiMode::Station => Configuration::Client(self.client.clone()),
            WifiMode::AccessPoint => Configuration::AccessPoint(self.access_point.clone()),
            WifiMode::Mixed => {
                Configuration::Mixed(self.client.clone(), self.access_point.clone())
            }
        };

        self.wifi.set_configuration(&conf)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
            info!("WiFi started");
        }
        Ok(())
    }

    fn swap_station_netif(&mut self, station: &StationConfig) -> Result<()> {
        let ip_configuration = match station.address {
            Some(address) => {
                let mask = addr::prefix_len(address.subnet_mask).ok_or_else(|| {
                    Error::InvalidConfig(format!("subnet mask {} is not contiguous", address.subnet_mask))
                })?;
                IpConfiguration::Client(IpClientConfiguration::Fixed(IpClientSettings {
                    ip: address.ip,
                    subnet: Subnet {
                        gateway: address.gateway,
                        mask: Mask(mask),
                    },
                    dns: address.dns1,
                    secondary_dns: address.dns2,
                }))
            }
            None if self.static_sta => IpConfiguration::Client(Default::default()),
            // Already on the DHCP interface
            None => return Ok(()),
        };

        let netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration,
            ..NetifConfiguration::wifi_default_client()
        })?;
        self.wifi.swap_netif_sta(netif)?;
        self.static_sta = station.address.is_some();
        Ok(())
    }
}

impl WifiDriver for EspWifiDriver {
    fn mode(&self) -> Result<WifiMode> {
        Ok(self.mode)
    }

    fn set_mode(&mut self, mode: WifiMode) -> Result<()> {
        self.mode = mode;
        self.apply()
    }

    fn connect_station(&mut self, station: &StationConfig) -> Result<()> {
        self.client = ClientConfiguration {
            ssid: station.ssid.clone(),
            password: station.passphrase.clone().unwrap_or_default(),
            auth_method: if station.passphrase.is_some() {
                EspAuthMethod::WPA2Personal
            } else {
                EspAuthMethod::None
            },
            ..Default::default()
        };

        if self.wifi.is_connected()? {
            self.wifi.disconnect()?;
        }
        self.swap_station_netif(station)?;
        self.apply()?;

        self.set_status(WifiStatus::Idle);
        self.wifi.connect()?;
        Ok(())
    }

    fn disconnect_station(&mut self) -> Result<()> {
        if self.wifi.is_started()? {
            self.wifi.disconnect()?;
        }
        Ok(())
    }

    fn erase_station_credentials(&mut self) -> Result<()> {
        self.client = ClientConfiguration::default();
        // The radio persists its configuration to flash, so overwrite it there too
        if self.mode.has_station() {
            self.apply()?;
        }
        Ok(())
    }

    fn station_status(&self) -> WifiStatus {
        let recorded = self.status.lock().map(|s| *s).unwrap_or(WifiStatus::Idle);
        if recorded != WifiStatus::Connected {
            return recorded;
        }
        // Associated but still waiting for an address
        match self.wifi.sta_netif().is_up() {
            Ok(true) => WifiStatus::Connected,
            Ok(false) => WifiStatus::Idle,
            Err(e) => {
                warn!("Failed to query station interface: {}", e);
                WifiStatus::Idle
            }
        }
    }

    fn station_ip_info(&self) -> Result<IpInfo> {
        let info = self.wifi.sta_netif().get_ip_info()?;
        Ok(IpInfo {
            ip: info.ip,
            subnet_mask: addr::mask_from_prefix(info.subnet.mask.0),
            gateway: info.subnet.gateway,
            dns1: info.dns,
            dns2: info.secondary_dns,
        })
    }

    fn start_access_point(&mut self, access_point: &AccessPointConfig) -> Result<()> {
        if access_point.ftm_responder {
            warn!("FTM responder is not exposed by this backend, ignoring");
        }
        if !matches!(access_point.cipher, Cipher::Ccmp | Cipher::None) {
            warn!("Cipher {:?} is not exposed by this backend, radio default used", access_point.cipher);
        }

        self.access_point = AccessPointConfiguration {
            ssid: access_point.ssid.clone(),
            ssid_hidden: access_point.hidden,
            channel: access_point.channel,
            auth_method: esp_auth_method(access_point.auth_method),
            password: access_point.passphrase.clone().unwrap_or_default(),
            max_connections: u16::from(access_point.max_connections),
            ..Default::default()
        };
        self.apply()
    }

    /// Blanks the AP configuration; the mode is left to the caller
    fn stop_access_point(&mut self) -> Result<()> {
        self.access_point = AccessPointConfiguration {
            ssid: Default::default(),
            password: Default::default(),
            auth_method: EspAuthMethod::None,
            ..Default::default()
        };
        if self.mode.has_access_point() {
            self.apply()?;
        }
        Ok(())
    }

    fn configure_access_point_address(&mut self, address: &SoftApAddress) -> Result<()> {
        let mask = addr::prefix_len(address.subnet_mask).ok_or_else(|| {
            Error::InvalidConfig(format!("subnet mask {} is not contiguous", address.subnet_mask))
        })?;
        // The AP netif serves its own address as the gateway
        if address.gateway != address.local_ip {
            warn!("Soft AP gateway {} differs from AP address, using {}", address.gateway, address.local_ip);
        }
        if address.dhcp_lease_start != addr::next_address(address.local_ip) {
            warn!("Custom DHCP lease start is not exposed by this backend, leases follow the AP address");
        }

        let netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration: IpConfiguration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway: address.local_ip,
                    mask: Mask(mask),
                },
                dhcp_enabled: true,
                dns: address.dns,
                secondary_dns: None,
            }),
            ..NetifConfiguration::wifi_default_router()
        })?;
        self.wifi.swap_netif_ap(netif)?;
        self.apply()
    }

    fn access_point_ssid(&self) -> Result<Option<String>> {
        if !self.mode.has_access_point() {
            return Ok(None);
        }
        Ok(Some(self.access_point.ssid.to_string()))
    }

    fn access_point_ip_info(&self) -> Result<IpInfo> {
        let info = self.wifi.ap_netif().get_ip_info()?;
        Ok(IpInfo {
            ip: info.ip,
            subnet_mask: addr::mask_from_prefix(info.subnet.mask.0),
            gateway: info.subnet.gateway,
            dns1: info.dns,
            dns2: info.secondary_dns,
        })
    }

    fn access_point_mac(&self) -> Result<[u8; 6]> {
        Ok(self.wifi.ap_netif().get_mac()?)
    }

    fn access_point_station_count(&self) -> Result<usize> {
        let mut list = wifi_sta_list_t::default();
        esp!(unsafe { esp_wifi_ap_get_sta_list(&mut list) })?;
        Ok(list.num as usize)
    }
}

fn disconnect_status(reason: u16, previous: WifiStatus) -> WifiStatus {
    match reason {
        REASON_NO_AP_FOUND => WifiStatus::NoSsidAvail,
        REASON_AUTH_EXPIRE
        | REASON_4WAY_HANDSHAKE_TIMEOUT
        | REASON_AUTH_FAIL
        | REASON_ASSOC_FAIL
        | REASON_HANDSHAKE_TIMEOUT => WifiStatus::ConnectFailed,
        REASON_ASSOC_LEAVE => WifiStatus::Disconnected,
        _ if previous == WifiStatus::Connected => WifiStatus::ConnectionLost,
        _ => WifiStatus::Disconnected,
    }
}

fn esp_auth_method(method: AuthMethod) -> EspAuthMethod {
    match method {
        AuthMethod::None => EspAuthMethod::None,
        AuthMethod::Wep => EspAuthMethod::WEP,
        AuthMethod::WpaPersonal => EspAuthMethod::WPA,
        AuthMethod::Wpa2Personal => EspAuthMethod::WPA2Personal,
        AuthMethod::WpaWpa2Personal => EspAuthMethod::WPAWPA2Personal,
        AuthMethod::Wpa3Personal => EspAuthMethod::WPA3Personal,
        AuthMethod::Wpa2Wpa3Personal => EspAuthMethod::WPA2WPA3Personal,
    }
}
