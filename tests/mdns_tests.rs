use netscope::collect::mdns::{format_service_type, parse_dynamic_types};

#[test]
fn dynamic_discovery_parses_add_rows() {
    let stdout = "\
Browsing for _services._dns-sd._udp.local.
DATE: ---Sat 02 Aug 2025---
14:15:04.810  Add        3   6 .        _tcp.local.          _airplay
14:15:04.810  Add        3   6 .        _tcp.local.          _companion-link
14:15:04.811  Add        3   6 .        _udp.local.          _sleep-proxy
14:15:05.120  Rmv        2   6 .        _tcp.local.          _gone
";
    let types = parse_dynamic_types(stdout);
    assert_eq!(
        types,
        vec![
            "_airplay._tcp.local.",
            "_companion-link._tcp.local.",
            "_sleep-proxy._udp.local.",
        ]
    );
}

#[test]
fn dynamic_discovery_dedupes_and_tolerates_truncation() {
    let stdout = "\
14:15:04.810  Add        3   6 .        _tcp.local.          _airplay
14:15:04.811  Add        3   6 .        _tcp.local.          _airplay
14:15:04.812  Add        3   6 .        _tcp.loc";
    let types = parse_dynamic_types(stdout);
    assert_eq!(types, vec!["_airplay._tcp.local."]);
}

#[test]
fn dynamic_discovery_ignores_non_service_instances() {
    let stdout = "14:15:04.810  Add        3   6 .        _tcp.local.          plainname\n";
    assert!(parse_dynamic_types(stdout).is_empty());
}

#[test]
fn service_type_formatting_strips_local_suffix() {
    assert_eq!(format_service_type("_airplay._tcp.local."), "_airplay._tcp");
    assert_eq!(format_service_type("_hue._tcp.local"), "_hue._tcp");
    assert_eq!(format_service_type("_x._udp.local."), "_x._udp");
}
