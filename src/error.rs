use std::fmt;
use std::io;
use std::error::Error as StdError;

/// Everything the WiFi helper, the TCP server and the TCP client can fail with
#[derive(Debug)]
pub enum Error {
    /// Socket bind, accept, connect or write failure
    Io(io::Error),
    /// Non-zero `esp_err_t` from the ESP-IDF WiFi or netif calls
    EspError(String),
    /// Station or soft AP request the helper cannot carry out, e.g. connecting without credentials
    WiFiError(String),
    /// Listener or outbound connection setup failed
    TcpError(String),
    /// SSID, passphrase, channel or addressing rejected before reaching the radio
    InvalidConfig(String),
    General(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::EspError(msg) => write!(f, "ESP-IDF error: {}", msg),
            Error::WiFiError(msg) => write!(f, "WiFi error: {}", msg),
            Error::TcpError(msg) => write!(f, "TCP error: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::General(err.to_string())
    }
}

#[cfg(target_os = "espidf")]
impl From<esp_idf_svc::sys::EspError> for Error {
    fn from(err: esp_idf_svc::sys::EspError) -> Self {
        Error::EspError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_source() {
        let err = Error::from(io::Error::new(io::ErrorKind::AddrInUse, "port 80 taken"));
        assert_eq!(err.to_string(), "I/O error: port 80 taken");
        assert!(err.source().is_some());
    }

    #[test]
    fn config_errors_are_prefixed() {
        let err = Error::InvalidConfig("invalid AP channel 15".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: invalid AP channel 15");
        assert!(err.source().is_none());
    }
}
