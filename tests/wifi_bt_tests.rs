use netscope::collect::bluetooth::parse_profiler_json as parse_bluetooth;
use netscope::collect::wifi::{
    first_preferred_network, parse_profiler_json as parse_wifi, parse_rssi, security_label,
};
use netscope::collect::{first_signed_int, signal_strength_from_rssi};
use netscope::model::Band;
use serde_json::json;

// ===== Wi-Fi =====

#[test]
fn wifi_profiler_walk_keeps_station_records_with_channel() {
    let fixture = json!({
        "SPAirPortDataType": [{
            "spairport_airport_interfaces": [
                {
                    "_name": "en0",
                    "spairport_current_network_information": {
                        "_name": "HomeWiFi",
                        "spairport_network_channel": "36 (5GHz, 80MHz)",
                        "spairport_signal_noise": "-55 dBm / -92 dBm",
                        "spairport_security_mode": "spairport_security_mode_wpa2_personal"
                    }
                },
                { "_name": "awdl0" }
            ]
        }]
    });
    let records = parse_wifi(&fixture);
    assert_eq!(records.len(), 1);
    let ap = &records[0];
    assert_eq!(ap.ssid, "HomeWiFi");
    assert_eq!(ap.channel, 36);
    assert_eq!(ap.rssi, Some(-55));
    assert_eq!(ap.security.as_deref(), Some("WPA2 Personal"));
}

#[test]
fn wifi_channel_accepts_plain_numbers() {
    let fixture = json!({
        "SPAirPortDataType": [{
            "spairport_airport_interfaces": [{
                "_name": "en0",
                "spairport_current_network_information": {
                    "_name": "Attic",
                    "spairport_network_channel": 11
                }
            }]
        }]
    });
    let records = parse_wifi(&fixture);
    assert_eq!(records[0].channel, 11);
    assert_eq!(records[0].rssi, None);
}

#[test]
fn band_is_a_function_of_channel() {
    assert_eq!(Band::from_channel(1), Band::Ghz2_4);
    assert_eq!(Band::from_channel(14), Band::Ghz2_4);
    assert_eq!(Band::from_channel(36), Band::Ghz5);
    assert_eq!(Band::from_channel(177), Band::Ghz5);
    assert_eq!(Band::from_channel(181), Band::Ghz6);
}

#[test]
fn rssi_parsing_and_strength_mapping() {
    assert_eq!(parse_rssi(&json!(-55)), Some(-55));
    assert_eq!(parse_rssi(&json!("-55 dBm / -92 dBm")), Some(-55));
    assert_eq!(parse_rssi(&json!(null)), None);

    assert_eq!(first_signed_int("noise -92"), Some(-92));
    assert_eq!(first_signed_int("no numbers"), None);

    // clamp((rssi + 90) * 100 / 60, 0, 100)
    assert_eq!(signal_strength_from_rssi(-90), 0);
    assert_eq!(signal_strength_from_rssi(-100), 0);
    assert_eq!(signal_strength_from_rssi(-60), 50);
    assert_eq!(signal_strength_from_rssi(-30), 100);
    assert_eq!(signal_strength_from_rssi(-20), 100);
}

#[test]
fn security_mode_labels() {
    assert_eq!(
        security_label("spairport_security_mode_wpa2_personal"),
        "WPA2 Personal"
    );
    assert_eq!(
        security_label("spairport_security_mode_wpa3_transition"),
        "WPA3 Transition"
    );
    assert_eq!(security_label("spairport_security_mode_none"), "None");
}

#[test]
fn preferred_network_fallback_takes_first_entry() {
    let listing = "Preferred networks on en0:\n\tHomeWiFi\n\tGuestWiFi\n";
    assert_eq!(first_preferred_network(listing).as_deref(), Some("HomeWiFi"));
    assert_eq!(first_preferred_network("Preferred networks on en0:\n"), None);
}

// ===== Bluetooth =====

#[test]
fn bluetooth_sections_are_unioned() {
    let fixture = json!({
        "SPBluetoothDataType": [{
            "controller_properties": { "controller_address": "00:11:22:33:44:55" },
            "device_connected": [
                { "AirPods Pro": {
                    "device_address": "AA:BB:CC:11:22:33",
                    "device_minorType": "Headphones",
                    "device_batteryLevelMain": "75%",
                    "device_rssi": -45
                }}
            ],
            "device_not_connected": [
                { "Magic Keyboard": { "device_address": "AA:BB:CC:44:55:66" } }
            ],
            "devices_not_connected": [
                { "Old Phone": {} }
            ]
        }]
    });
    let peers = parse_bluetooth(&fixture);
    assert_eq!(peers.len(), 3);

    let airpods = peers.iter().find(|p| p.name == "AirPods Pro").unwrap();
    assert!(airpods.is_connected);
    assert_eq!(airpods.mac.as_deref(), Some("aa:bb:cc:11:22:33"));
    assert_eq!(airpods.battery_level, Some(75));
    assert_eq!(airpods.rssi, Some(-45));
    assert_eq!(airpods.minor_type.as_deref(), Some("Headphones"));

    let keyboard = peers.iter().find(|p| p.name == "Magic Keyboard").unwrap();
    assert!(!keyboard.is_connected);

    let old_phone = peers.iter().find(|p| p.name == "Old Phone").unwrap();
    assert_eq!(old_phone.mac, None);
}

#[test]
fn bluetooth_indicator_key_overrides_section() {
    let fixture = json!({
        "SPBluetoothDataType": [{
            "device_not_connected": [
                { "Pencil": { "device_isconnected": "attrib_Yes" } }
            ]
        }]
    });
    let peers = parse_bluetooth(&fixture);
    assert!(peers[0].is_connected);
}

#[test]
fn bluetooth_rssi_accepts_string_values() {
    let fixture = json!({
        "SPBluetoothDataType": [{
            "device_connected": [
                { "Speaker": { "device_rssi": "-60 dBm", "device_batteryLevel": "40" } }
            ]
        }]
    });
    let peers = parse_bluetooth(&fixture);
    assert_eq!(peers[0].rssi, Some(-60));
    assert_eq!(peers[0].battery_level, Some(40));
}

#[test]
fn bluetooth_tolerates_missing_sections() {
    let fixture = json!({ "SPBluetoothDataType": [ {} ] });
    assert!(parse_bluetooth(&fixture).is_empty());
    assert!(parse_bluetooth(&json!({})).is_empty());
}
