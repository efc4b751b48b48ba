//! Snapshot assembly, link-type inference and signal conversions.

use super::extract::*;
use super::types::{InterfaceHint, InterfaceSnapshot, LinkType};

/// Readings at or above this are reported as 100% quality
pub const SIGNAL_UPPER_DBM: f64 = -50.0;
/// Readings at or below this are reported as 0% quality
pub const SIGNAL_LOWER_DBM: f64 = -100.0;

const WIRELESS_LABELS: [&str; 6] = ["wi-fi", "wifi", "wlan", "airport", "wireless", "802.11"];
const WIRED_LABELS: [&str; 6] = ["ethernet", "thunderbolt", "usb", "pci", "lan", "eth"];

/// Map a dBm reading onto 0..=100, clamped, linear in between
pub fn dbm_to_percent(dbm: f64) -> f64 {
    if dbm >= SIGNAL_UPPER_DBM {
        100.0
    } else if dbm <= SIGNAL_LOWER_DBM {
        0.0
    } else {
        (dbm - SIGNAL_LOWER_DBM) * 100.0 / (SIGNAL_UPPER_DBM - SIGNAL_LOWER_DBM)
    }
}

/// Inverse of [`dbm_to_percent`] for tools that only report percent
pub fn percent_to_dbm(percent: f64) -> f64 {
    let pct = percent.clamp(0.0, 100.0);
    SIGNAL_LOWER_DBM + pct * (SIGNAL_UPPER_DBM - SIGNAL_LOWER_DBM) / 100.0
}

/// Signal-to-noise ratio in dB when both readings exist
pub fn snr_db(signal_dbm: Option<f64>, noise_dbm: Option<f64>) -> Option<f64> {
    Some(signal_dbm? - noise_dbm?)
}

/// Link family from a hardware-port label or device name
pub fn infer_link_type(label: Option<&str>) -> LinkType {
    let Some(label) = label else {
        return LinkType::Other;
    };
    let label = label.to_ascii_lowercase();
    if WIRELESS_LABELS.iter().any(|w| label.contains(w)) {
        LinkType::Wifi
    } else if WIRED_LABELS.iter().any(|w| label.contains(w)) {
        LinkType::Ethernet
    } else {
        LinkType::Other
    }
}

/// Build a snapshot from raw interface text.
///
/// Fields are extracted independently; whatever is missing stays `None`.
pub fn classify(raw: &str, hint: &InterfaceHint) -> InterfaceSnapshot {
    let name = hint.name.clone().or_else(|| extract_interface_name(raw));

    let hardware_port = hint
        .hardware_port
        .clone()
        .or_else(|| name.as_deref().and_then(|dev| extract_hardware_port(raw, dev)))
        .or_else(|| extract_description(raw));

    let link_type = match infer_link_type(hardware_port.as_deref()) {
        LinkType::Other if hardware_port.is_none() => infer_link_type(name.as_deref()),
        other => other,
    };

    let reported_rssi = extract_rssi_dbm(raw);
    let reported_percent = extract_signal_percent(raw);
    let noise_dbm = extract_noise_dbm(raw);

    let signal_percent = reported_percent.or_else(|| reported_rssi.map(dbm_to_percent));
    let rssi_dbm = reported_rssi.or_else(|| reported_percent.map(percent_to_dbm));
    let snr = snr_db(reported_rssi, noise_dbm);

    let (ssid, bssid) = if link_type == LinkType::Wifi {
        (extract_ssid(raw), extract_bssid(raw))
    } else {
        (None, None)
    };

    let snapshot = InterfaceSnapshot {
        name,
        hardware_port,
        link_type,
        ssid,
        bssid,
        channel: extract_channel(raw),
        rssi_dbm,
        noise_dbm,
        signal_percent,
        snr_db: snr,
        rate_mbps: extract_rate_mbps(raw),
    };

    log::debug!(
        "Interface {:?}: {} rssi={:?} rate={:?}",
        snapshot.name,
        snapshot.link_type,
        snapshot.rssi_dbm,
        snapshot.rate_mbps
    );

    snapshot
}
