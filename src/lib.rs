// 导出模块
pub mod config;
pub mod error;
pub mod tcp_client;
pub mod tcp_server;
pub mod wifi;

mod connection;
mod line;

// 重新导出一些公共接口，使它们可以直接从 crate 根访问
pub use config::{create_config, AppConfig, SecondClientPolicy, TcpClientConfig, TcpServerConfig};
pub use error::{Error, Result};
pub use tcp_client::{ServerAddress, TcpClient};
pub use tcp_server::TcpServer;
pub use wifi::{WifiDriver, WifiHelper};
