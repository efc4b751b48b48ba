//! Independent field extractors over raw interface text.
//!
//! Each function looks for one field and nothing else, so an unexpected line
//! never affects a different field.

use std::sync::LazyLock;

use regex::Regex;

/// Compiled patterns for interface dumps (airport -I, netsh wlan, iw, networksetup)
pub struct InterfacePatterns {
    /// Match: "SSID: MyNet", "    SSID                   : MyNet"
    pub ssid: Regex,
    /// Match: "BSSID: aa:bb:cc:dd:ee:ff", "AP BSSID : ...", "Connected to aa:bb:..."
    pub bssid: Regex,
    /// Match: "channel: 36,80", "Channel : 6"
    pub channel: Regex,
    /// Match: "freq: 5180"
    pub frequency: Regex,
    /// Match: "agrCtlRSSI: -55", "signal: -55 dBm", "RSSI: -60"
    pub rssi: Regex,
    /// Match: "Signal : 90%"
    pub signal_percent: Regex,
    /// Match: "agrCtlNoise: -90", "noise: -92 dBm"
    pub noise: Regex,
    /// Match: "lastTxRate: 300", "Transmit rate (Mbps) : 866.7", "tx bitrate: 866.7 MBit/s"
    pub rate: Vec<Regex>,
    /// Match: "Name : Wi-Fi", "Connected to ... (on wlan0)", "Interface wlan0"
    pub name: Vec<Regex>,
    /// Match: "Description : Intel(R) Wi-Fi 6 AX201 160MHz"
    pub description: Regex,
    /// Match: "Hardware Port: Wi-Fi"
    pub hardware_port: Regex,
    /// Match: "Device: en0"
    pub device: Regex,
}

impl InterfacePatterns {
    pub fn new() -> Self {
        Self {
            ssid: Regex::new(r"(?m)^[ \t]*SSID[ \t]*:[ \t]*(.*?)[ \t]*$").expect("Invalid ssid regex"),
            bssid: Regex::new(
                r"(?mi)^[ \t]*(?:AP[ \t]+)?BSSID[ \t]*:[ \t]*([0-9a-f]{1,2}(?::[0-9a-f]{1,2}){5})|Connected to ([0-9a-f]{2}(?::[0-9a-f]{2}){5})",
            )
            .expect("Invalid bssid regex"),
            channel: Regex::new(r"(?mi)^[ \t]*channel[ \t]*:[ \t]*(\d+)").expect("Invalid channel regex"),
            frequency: Regex::new(r"(?mi)^[ \t]*freq[ \t]*:[ \t]*(\d+)").expect("Invalid frequency regex"),
            rssi: Regex::new(r"(?mi)^[ \t]*(?:agrCtlRSSI|RSSI|signal)[ \t]*:[ \t]*(-\d+(?:\.\d+)?)")
                .expect("Invalid rssi regex"),
            signal_percent: Regex::new(r"(?mi)^[ \t]*Signal[ \t]*:[ \t]*(\d+(?:\.\d+)?)[ \t]*%")
                .expect("Invalid signal_percent regex"),
            noise: Regex::new(r"(?mi)^[ \t]*(?:agrCtlNoise|noise)[ \t]*:[ \t]*(-\d+(?:\.\d+)?)")
                .expect("Invalid noise regex"),
            rate: vec![
                Regex::new(r"(?mi)^[ \t]*lastTxRate[ \t]*:[ \t]*(\d+(?:\.\d+)?)")
                    .expect("Invalid lastTxRate regex"),
                Regex::new(r"(?mi)^[ \t]*Transmit rate \(Mbps\)[ \t]*:[ \t]*(\d+(?:\.\d+)?)")
                    .expect("Invalid transmit rate regex"),
                Regex::new(r"(?mi)^[ \t]*tx bitrate[ \t]*:[ \t]*(\d+(?:\.\d+)?)[ \t]*MBit/s")
                    .expect("Invalid tx bitrate regex"),
            ],
            name: vec![
                Regex::new(r"(?m)^[ \t]*Name[ \t]*:[ \t]*(.*?)[ \t]*$").expect("Invalid name regex"),
                Regex::new(r"\(on ([^\s)]+)\)").expect("Invalid iw link regex"),
                Regex::new(r"(?m)^[ \t]*Interface[ \t]+(\S+)[ \t]*$").expect("Invalid iw dev regex"),
            ],
            description: Regex::new(r"(?m)^[ \t]*Description[ \t]*:[ \t]*(.*?)[ \t]*$")
                .expect("Invalid description regex"),
            hardware_port: Regex::new(r"^[ \t]*Hardware Port:[ \t]*(.*?)[ \t]*$")
                .expect("Invalid hardware_port regex"),
            device: Regex::new(r"^[ \t]*Device:[ \t]*(\S+)").expect("Invalid device regex"),
        }
    }
}

impl Default for InterfacePatterns {
    fn default() -> Self {
        Self::new()
    }
}

pub static PATTERNS: LazyLock<InterfacePatterns> = LazyLock::new(InterfacePatterns::new);

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    let caps = re.captures(text)?;
    caps.iter().skip(1).flatten().next().map(|m| m.as_str())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub fn extract_ssid(text: &str) -> Option<String> {
    first_capture(&PATTERNS.ssid, text).and_then(non_empty)
}

pub fn extract_bssid(text: &str) -> Option<String> {
    first_capture(&PATTERNS.bssid, text).map(|s| s.to_ascii_lowercase())
}

/// Primary channel; derived from the frequency when only that is reported
pub fn extract_channel(text: &str) -> Option<u32> {
    if let Some(ch) = first_capture(&PATTERNS.channel, text).and_then(|s| s.parse().ok()) {
        return Some(ch);
    }
    first_capture(&PATTERNS.frequency, text)
        .and_then(|s| s.parse().ok())
        .and_then(frequency_to_channel)
}

/// 802.11 channel number for a centre frequency in MHz
pub fn frequency_to_channel(mhz: u32) -> Option<u32> {
    match mhz {
        2484 => Some(14),
        2412..=2472 => Some((mhz - 2407) / 5),
        5000..=5895 => Some((mhz - 5000) / 5),
        5955..=7115 => Some((mhz - 5950) / 5),
        _ => None,
    }
}

pub fn extract_rssi_dbm(text: &str) -> Option<f64> {
    first_capture(&PATTERNS.rssi, text).and_then(|s| s.parse().ok())
}

pub fn extract_signal_percent(text: &str) -> Option<f64> {
    first_capture(&PATTERNS.signal_percent, text).and_then(|s| s.parse().ok())
}

pub fn extract_noise_dbm(text: &str) -> Option<f64> {
    first_capture(&PATTERNS.noise, text).and_then(|s| s.parse().ok())
}

pub fn extract_rate_mbps(text: &str) -> Option<f64> {
    PATTERNS
        .rate
        .iter()
        .find_map(|re| first_capture(re, text))
        .and_then(|s| s.parse().ok())
}

pub fn extract_interface_name(text: &str) -> Option<String> {
    PATTERNS
        .name
        .iter()
        .find_map(|re| first_capture(re, text))
        .and_then(non_empty)
}

/// Adapter description (netsh), often naming the radio family
pub fn extract_description(text: &str) -> Option<String> {
    first_capture(&PATTERNS.description, text).and_then(non_empty)
}

/// Hardware-port label of `device` from `networksetup -listallhardwareports`
pub fn extract_hardware_port(text: &str, device: &str) -> Option<String> {
    let mut current_port: Option<&str> = None;
    for line in text.lines() {
        if let Some(port) = first_capture(&PATTERNS.hardware_port, line) {
            current_port = Some(port);
        } else if let Some(dev) = first_capture(&PATTERNS.device, line) {
            if dev == device {
                return current_port.and_then(non_empty);
            }
        }
    }
    None
}
