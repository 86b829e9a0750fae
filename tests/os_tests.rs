use netscope::enrich::os::{derive_category, fingerprint, FingerprintContext};
use netscope::enrich::probe::parse_probe_output;
use netscope::model::EntityPatch;
use std::collections::HashMap;
use test_utils::{bluetooth_entity, lan_entity, mdns_entity, seeded_store};


const T0: i64 = 1000;

fn no_probes() -> HashMap<String, String> {
    HashMap::new()
}

#[test]
fn vendor_and_hostname_infer_macos() {
    let mut store = seeded_store("192.168.1.2");
    let mut mac = lan_entity("a4:5e:60:00:11:22", "192.168.1.30", Some("Apple, Inc."));
    mac.name = "Johns-MacBook-Pro".to_string();
    store.upsert(mac, T0);

    let probes = no_probes();
    let patches = fingerprint(&store, &FingerprintContext::without_capture(&probes));
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].1;
    assert_eq!(patch.os_family.as_deref(), Some("macos"));
    // vendor 0.4 + hostname 0.5 = 0.9
    assert!((patch.os_fingerprint_confidence.unwrap() - 0.9).abs() < 1e-9);
    assert_eq!(patch.device_category.as_deref(), Some("desktop"));
}

#[test]
fn vendor_alone_is_below_the_floor() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("a4:5e:60:00:11:22", "192.168.1.30", Some("Apple, Inc.")),
        T0,
    );
    // Apple vendor votes 0.4 for both macos and ios; under the 0.45 floor.
    let probes = no_probes();
    assert!(fingerprint(&store, &FingerprintContext::without_capture(&probes)).is_empty());
}

#[test]
fn ttl_pushes_a_weak_signal_over_the_floor() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("00:15:5d:00:11:22", "192.168.1.31", Some("Microsoft Corporation")),
        T0,
    );
    let probes = no_probes();
    let ttl = |ip: &str| (ip == "192.168.1.31").then_some(128u8);
    let ctx = FingerprintContext {
        ttl_median: &ttl,
        probe_families: &probes,
    };
    let patches = fingerprint(&store, &ctx);
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].1;
    assert_eq!(patch.os_family.as_deref(), Some("windows"));
    // vendor 0.4 + ttl 0.3 = 0.7
    assert!((patch.os_fingerprint_confidence.unwrap() - 0.7).abs() < 1e-9);
}

#[test]
fn mdns_service_signal_fires_on_core_label() {
    let mut store = seeded_store("192.168.1.2");
    let mut mac = lan_entity("a4:5e:60:00:11:22", "192.168.1.30", Some("Apple, Inc."));
    mac.name = "study-machine".to_string();
    store.upsert(mac, T0);
    store.upsert(
        mdns_entity("_companion-link._tcp", "Study Machine", "192.168.1.30"),
        T0,
    );

    let probes = no_probes();
    let patches = fingerprint(&store, &FingerprintContext::without_capture(&probes));
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].1;
    assert_eq!(patch.os_family.as_deref(), Some("macos"));
    // vendor 0.4 + mdns 0.5 = 0.9
    assert!((patch.os_fingerprint_confidence.unwrap() - 0.9).abs() < 1e-9);
}

#[test]
fn bluetooth_name_and_minor_type_drive_mobile_category() {
    let mut store = seeded_store("192.168.1.2");
    let mut peer = bluetooth_entity("Marias iPhone", Some("Smartphone"));
    peer.name = "Marias iPhone".to_string();
    store.upsert(peer, T0);

    let probes = no_probes();
    let patches = fingerprint(&store, &FingerprintContext::without_capture(&probes));
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].1;
    assert_eq!(patch.os_family.as_deref(), Some("ios"));
    // hostname 0.5 + bluetooth 0.5 = 1.0
    assert!((patch.os_fingerprint_confidence.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(patch.device_category.as_deref(), Some("mobile"));
}

#[test]
fn settled_entities_are_untouched() {
    let mut store = seeded_store("192.168.1.2");
    let mut mac = lan_entity("a4:5e:60:00:11:22", "192.168.1.30", Some("Apple, Inc."));
    mac.name = "Johns-MacBook-Pro".to_string();
    store.upsert(mac, T0);
    store.patch(
        "lan-a4:5e:60:00:11:22",
        EntityPatch {
            os_family: Some("macos".to_string()),
            os_fingerprint_confidence: Some(0.92),
            ..EntityPatch::default()
        },
    );

    let probes = no_probes();
    assert!(fingerprint(&store, &FingerprintContext::without_capture(&probes)).is_empty());
}

#[test]
fn probe_family_dominates() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(lan_entity("b8:27:eb:00:11:22", "192.168.1.77", None), T0);
    let mut probes = HashMap::new();
    probes.insert("192.168.1.77".to_string(), "linux".to_string());

    let patches = fingerprint(&store, &FingerprintContext::without_capture(&probes));
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].1;
    assert_eq!(patch.os_family.as_deref(), Some("linux"));
    assert!((patch.os_fingerprint_confidence.unwrap() - 0.9).abs() < 1e-9);
}

#[test]
fn category_derivation_order() {
    // Bluetooth minor type takes precedence over everything.
    let headphones = bluetooth_entity("Buds", Some("Headphones"));
    assert_eq!(derive_category(&headphones, "android"), "iot");

    // Classifier category comes next.
    let mut nas = lan_entity("00:11:32:00:11:22", "192.168.1.90", Some("Synology"));
    if let netscope::model::SignalKind::Lan { device_type, .. } = &mut nas.kind {
        *device_type = Some("storage".to_string());
    }
    assert_eq!(derive_category(&nas, "linux"), "server");

    // OS family is the last resort.
    let plain = lan_entity("00:11:22:33:44:55", "192.168.1.91", None);
    assert_eq!(derive_category(&plain, "ios"), "mobile");
    assert_eq!(derive_category(&plain, "windows"), "desktop");
    assert_eq!(derive_category(&plain, "freebsd"), "server");
    assert_eq!(derive_category(&plain, "beos"), "unknown");
}

// ===== probe output parsing =====

#[test]
fn probe_os_details_line_parses() {
    let stdout = "\
Starting Nmap 7.95 ( https://nmap.org )
Nmap scan report for 192.168.1.30
OS details: Apple macOS 13 (Ventura) (92%), Apple macOS 12 (85%)
OS detection performed.
";
    let result = parse_probe_output(stdout).unwrap();
    assert_eq!(result.family, "macos");
    assert!((result.confidence - 0.92).abs() < 1e-9);
    assert_eq!(result.version.as_deref(), Some("Apple macOS 13 (Ventura)"));
}

#[test]
fn probe_running_guess_line_parses() {
    let stdout = "Running (JUST GUESSING): Linux 5.X (87%)\n";
    let result = parse_probe_output(stdout).unwrap();
    assert_eq!(result.family, "linux");
    assert!((result.confidence - 0.87).abs() < 1e-9);
}

#[test]
fn probe_without_percentage_defaults_confidence() {
    let stdout = "Running: Microsoft Windows 10\n";
    let result = parse_probe_output(stdout).unwrap();
    assert_eq!(result.family, "windows");
    assert!((result.confidence - 0.9).abs() < 1e-9);
}

#[test]
fn probe_family_order_prefers_windows_over_linux() {
    // A line naming several systems takes the first family in match order.
    let stdout = "OS details: Microsoft Windows Subsystem for Linux (90%)\n";
    let result = parse_probe_output(stdout).unwrap();
    assert_eq!(result.family, "windows");
}

#[test]
fn probe_unmatched_output_is_none() {
    assert!(parse_probe_output("Nmap done: 1 IP address (0 hosts up)\n").is_none());
    assert!(parse_probe_output("OS details: AmigaOS 3.1 (80%)\n").is_none());
}
