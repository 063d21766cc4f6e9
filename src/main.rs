#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // If using the `binstart` feature of `esp-idf-sys`, always keep this module imported
use log::{error, info};
use std::thread;
use std::time::Duration;

use espsocket::{
    config::{create_config, AppConfig, TcpServerConfig},
    error::Result,
    tcp_server::TcpServer,
};

fn main() -> anyhow::Result<()> {
    #[cfg(target_os = "espidf")]
    {
        // Initialize the ESP-IDF system
        esp_idf_sys::link_patches();

        // Configure logging
        esp_idf_svc::log::EspLogger::initialize_default();
    }
    info!("espsocket starting up...");

    // Create application configuration
    let config = create_config();
    info!("Configuration loaded");

    if let Err(e) = run(config) {
        error!("Error running application: {}", e);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(target_os = "espidf")]
fn run(config: AppConfig) -> Result<()> {
    let wifi = device::start_wifi(&config)?;
    let server_thread = spawn_server(config.tcp_server.clone(), config.poll_interval_ms)?;

    info!("==================================================");
    info!("Soft AP '{}' at {}", wifi.soft_ap_ssid(), wifi.soft_ap_ip());
    info!("Station IP: {}", wifi.local_ip());
    info!("TCP Server Port: {}", config.tcp_server.port);
    info!("==================================================");

    // 保持程序运行并定期检查状态
    let mut last_status = wifi.status();
    let mut last_stations = 0;
    while !server_thread.is_finished() {
        thread::sleep(Duration::from_secs(5));

        let status = wifi.status();
        if status != last_status {
            info!("WiFi station status: {:?} -> {:?} (IP {})", last_status, status, wifi.local_ip());
            last_status = status;
        }

        let stations = wifi.soft_ap_station_count();
        if stations != last_stations {
            info!("{} station(s) on the soft AP", stations);
            last_stations = stations;
        }
    }

    error!("TCP server thread exited");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn run(config: AppConfig) -> Result<()> {
    // No radio to configure off-device; serve on the host network
    let server_thread = spawn_server(config.tcp_server.clone(), config.poll_interval_ms)?;
    if server_thread.join().is_err() {
        error!("TCP server thread panicked");
    }
    Ok(())
}

fn spawn_server(server_config: TcpServerConfig, poll_interval_ms: u64) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tcp_server".into())
        .stack_size(8192) // 增加栈大小以防止栈溢出
        .spawn(move || {
            info!("TCP server thread started");
            if let Err(e) = serve_lines(server_config, Duration::from_millis(poll_interval_ms)) {
                error!("TCP server error: {}", e);
            }
        })
        .map_err(|e| espsocket::Error::General(format!("Failed to spawn TCP server thread: {}", e)))
}

/// Cooperative poll loop: hold one client and echo every line back to it
fn serve_lines(server_config: TcpServerConfig, poll_interval: Duration) -> Result<()> {
    let mut server = TcpServer::new(server_config);
    server.start_server()?;

    loop {
        if server.scan_client() {
            if let Some(addr) = server.client_addr() {
                server.send_line(&format!("hello {}", addr));
            }
        }

        let line = server.receive();
        if !line.is_empty() {
            info!("<- {}", line);
            server.send_line(&line);
        }

        thread::sleep(poll_interval);
    }
}

#[cfg(target_os = "espidf")]
mod device {
    use std::thread;
    use std::time::{Duration, Instant};

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
    use log::{info, warn};

    use espsocket::{
        config::AppConfig,
        error::Result,
        wifi::{EspWifiDriver, WifiHelper},
    };

    /// How long start-up waits for the station to associate before carrying on AP-only
    const STATION_WAIT: Duration = Duration::from_secs(10);

    pub(crate) fn start_wifi(config: &AppConfig) -> Result<WifiHelper<EspWifiDriver>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        let driver = EspWifiDriver::new(peripherals.modem, sysloop, Some(nvs))?;
        let mut wifi = WifiHelper::new(driver);
        info!("WiFi helper created");

        if let Some(address) = &config.wifi.soft_ap_address {
            wifi.soft_ap_config(address)?;
        }
        wifi.create_ap(&config.wifi.access_point)?;

        // 配置混合模式 (Configure mixed mode)
        let status = wifi.begin(config.wifi.station.clone())?;
        info!("Station connect requested, status {:?}", status);

        let started = Instant::now();
        while !wifi.is_connected() && started.elapsed() < STATION_WAIT {
            thread::sleep(Duration::from_millis(200));
        }
        if wifi.is_connected() {
            info!("WiFi client connected, IP {}", wifi.local_ip());
        } else {
            warn!(
                "WiFi client not connected after {:?}: {:?} (continuing in AP-only mode)",
                STATION_WAIT,
                wifi.status()
            );
        }

        Ok(wifi)
    }
}
