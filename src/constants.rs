/// Stable identifier of the Host entity. Every relation terminates here.
pub const HOST_ID: &str = "this-device";

/// Interface the Wi-Fi fallbacks assume when the default route gives nothing.
pub const PRIMARY_WIFI_INTERFACE: &str = "en0";

/// Built-in OUI (Organizationally Unique Identifier) database
/// This serves as a fallback when the external manuf.txt file is not available
pub const BUILTIN_OUI: &str = r#"
00:00:5E   IANA
00:17:F2   Apple, Inc.
00:1C:B3   Apple, Inc.
00:26:BB   Apple, Inc.
A4:5E:60   Apple, Inc.
00:1A:11   Samsung Electronics Co.,Ltd
D8:27:27   Samsung Electronics Co.,Ltd
B8:27:EB   Raspberry Pi Foundation
DC:A6:32   Raspberry Pi Trading Ltd
00:0C:29   VMware, Inc.
00:50:56   VMware, Inc.
00:0F:FE   Intel Corporate
00:18:8B   Microsoft Corporation
00:22:48   Microsoft Corporation
00:0D:3A   Microsoft Corporation
00:15:5D   Microsoft Corporation
00:00:0C   Cisco Systems, Inc
00:01:42   Cisco Systems, Inc
00:01:43   Cisco Systems, Inc
00:01:63   Cisco Systems, Inc
00:01:64   Cisco Systems, Inc
00:01:96   Cisco Systems, Inc
00:01:97   Cisco Systems, Inc
00:02:16   Cisco Systems, Inc
00:17:88   Philips Lighting BV
EC:B5:FA   Philips Lighting BV
5C:AA:FD   Sonos, Inc.
B8:E9:37   Sonos, Inc.
24:0A:C4   Espressif Inc.
30:AE:A4   Espressif Inc.
F4:F5:D8   Google, Inc.
54:60:09   Google, Inc.
44:65:0D   Amazon Technologies Inc.
FC:65:DE   Amazon Technologies Inc.
00:11:32   Synology Incorporated
00:04:F2   Polycom
64:16:66   Nest Labs Inc.
18:B4:30   Nest Labs Inc.
"#;

/// mDNS-SD service types browsed unconditionally. The dynamic discovery pass
/// extends this set at runtime.
pub const COMMON_SERVICE_TYPES: &[&str] = &[
    "_airplay._tcp.local.",
    "_raop._tcp.local.",
    "_companion-link._tcp.local.",
    "_homekit._tcp.local.",
    "_hap._tcp.local.",
    "_http._tcp.local.",
    "_https._tcp.local.",
    "_ipp._tcp.local.",
    "_ipps._tcp.local.",
    "_printer._tcp.local.",
    "_pdl-datastream._tcp.local.",
    "_ssh._tcp.local.",
    "_sftp-ssh._tcp.local.",
    "_smb._tcp.local.",
    "_afpovertcp._tcp.local.",
    "_spotify-connect._tcp.local.",
    "_googlecast._tcp.local.",
    "_sonos._tcp.local.",
    "_hue._tcp.local.",
    "_workstation._tcp.local.",
];

/// Well-known TCP service names used when assembling socket display names.
pub fn service_name_for_port(port: u16) -> Option<&'static str> {
    match port {
        21 => Some("ftp"),
        22 => Some("ssh"),
        23 => Some("telnet"),
        25 => Some("smtp"),
        53 => Some("dns"),
        80 => Some("http"),
        110 => Some("pop3"),
        143 => Some("imap"),
        443 => Some("https"),
        465 => Some("smtps"),
        587 => Some("submission"),
        993 => Some("imaps"),
        995 => Some("pop3s"),
        1883 => Some("mqtt"),
        3306 => Some("mysql"),
        3389 => Some("rdp"),
        5222 => Some("xmpp"),
        5432 => Some("postgres"),
        5900 => Some("vnc"),
        6379 => Some("redis"),
        8080 => Some("http-alt"),
        8443 => Some("https-alt"),
        _ => None,
    }
}
