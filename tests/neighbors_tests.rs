use netscope::collect::neighbors::parse_neighbor_line;
use netscope::db::vendor::normalize_mac;

#[test]
fn parses_standard_neighbor_line() {
    let entry = parse_neighbor_line(
        "? (192.168.1.42) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]",
    )
    .unwrap();
    assert_eq!(entry.ip, "192.168.1.42");
    assert_eq!(entry.mac, "aa:bb:cc:dd:ee:ff");
    assert_eq!(entry.interface, "en0");
    assert!(!entry.is_gateway);
}

#[test]
fn single_digit_octets_are_zero_padded() {
    let entry =
        parse_neighbor_line("? (192.168.1.7) at 0:1b:63:4:a:ff on en0 ifscope [ethernet]").unwrap();
    assert_eq!(entry.mac, "00:1b:63:04:0a:ff");
}

#[test]
fn gateway_needs_scope_flag_and_dot_one() {
    let gateway = parse_neighbor_line(
        "? (192.168.1.1) at 11:22:33:44:55:66 on en0 ifscope [ethernet]",
    )
    .unwrap();
    assert!(gateway.is_gateway);

    // .1 without the scope flag stays a plain neighbor.
    let unflagged =
        parse_neighbor_line("? (192.168.1.1) at 11:22:33:44:55:66 on en0 [ethernet]").unwrap();
    assert!(!unflagged.is_gateway);

    // Scope flag on a non-.1 address likewise.
    let not_dot_one = parse_neighbor_line(
        "? (192.168.1.254) at 11:22:33:44:55:66 on en0 ifscope [ethernet]",
    )
    .unwrap();
    assert!(!not_dot_one.is_gateway);
}

#[test]
fn incomplete_and_broadcast_entries_are_skipped() {
    assert!(parse_neighbor_line("? (192.168.1.77) at (incomplete) on en0 ifscope [ethernet]").is_none());
    assert!(parse_neighbor_line(
        "? (192.168.1.255) at ff:ff:ff:ff:ff:ff on en0 ifscope [ethernet]"
    )
    .is_none());
    assert!(parse_neighbor_line("garbage line").is_none());
    assert!(parse_neighbor_line("").is_none());
}

#[test]
fn mac_normalization_forms() {
    assert_eq!(
        normalize_mac("AA-BB-CC-DD-EE-FF").as_deref(),
        Some("aa:bb:cc:dd:ee:ff")
    );
    assert_eq!(
        normalize_mac("aabbccddeeff").as_deref(),
        Some("aa:bb:cc:dd:ee:ff")
    );
    assert_eq!(
        normalize_mac("0:1:2:3:4:5").as_deref(),
        Some("00:01:02:03:04:05")
    );
    assert_eq!(normalize_mac("not-a-mac"), None);
    assert_eq!(normalize_mac("aa:bb:cc"), None);
}
