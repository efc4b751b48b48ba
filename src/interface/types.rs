use serde::{Deserialize, Serialize};

/// Physical link family of the interface under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Wifi,
    Ethernet,
    #[default]
    Other,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Wifi => "wifi",
            LinkType::Ethernet => "ethernet",
            LinkType::Other => "other",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller knows about the active interface before parsing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceHint {
    /// Device name, e.g. "en0"
    pub name: Option<String>,
    /// Hardware-port label, e.g. "Wi-Fi"
    pub hardware_port: Option<String>,
}

/// Typed interface state for one run. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    pub name: Option<String>,
    pub hardware_port: Option<String>,
    pub link_type: LinkType,
    /// Only kept for wifi links
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub channel: Option<u32>,
    pub rssi_dbm: Option<f64>,
    pub noise_dbm: Option<f64>,
    pub signal_percent: Option<f64>,
    pub snr_db: Option<f64>,
    /// Negotiated (last transmit) rate
    pub rate_mbps: Option<f64>,
}
