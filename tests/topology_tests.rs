use netscope::collect::topology::{parse_destination, parse_routing_table};
use netscope::model::HostInterface;
use netscope::net::interface::{ip_in_subnet, match_subnet};
use std::net::Ipv4Addr;

const NETSTAT_FIXTURE: &str = "\
Routing tables

Internet:
Destination        Gateway            Flags           Netif Expire
default            192.168.1.1        UGScg             en0
127                127.0.0.1          UCS               lo0
127.0.0.1          127.0.0.1          UH                lo0
169.254            link#12            UCS               en0      !
192.168.1          link#12            UCS               en0      !
192.168.1.1/32     link#12            UCSI              en0      !
192.168.1.42       aa:bb:cc:dd:ee:ff  UHLWIi            en0   1165
10.8               10.8.0.1           UGSc            utun3
172.16.5.0/22      link#14            UCS               en1      !
224.0.0/4          link#12            UmCS              en0      !
255.255.255.255/32 link#12            UCS               en0      !
192.168.1          link#12            UCS               en0      !

Internet6:
fe80::%lo0/64      fe80::1%lo0        UcIg              lo0
";

fn interfaces() -> Vec<HostInterface> {
    vec![
        HostInterface {
            name: "en0".to_string(),
            ipv4: "192.168.1.2".to_string(),
            mac: None,
        },
        HostInterface {
            name: "en1".to_string(),
            ipv4: "172.16.5.9".to_string(),
            mac: None,
        },
        // utun3 deliberately absent: its route row must be dropped.
    ]
}

#[test]
fn parses_attached_subnets_only() {
    let subnets = parse_routing_table(NETSTAT_FIXTURE, &interfaces());
    let cidrs: Vec<&str> = subnets.iter().map(|s| s.cidr.as_str()).collect();
    assert_eq!(cidrs, vec!["192.168.1.0/24", "172.16.5.0/22"]);

    let lan = &subnets[0];
    assert_eq!(lan.network, "192.168.1.0");
    assert_eq!(lan.prefix_len, 24);
    assert_eq!(lan.interface, "en0");
    assert_eq!(lan.local_ip, "192.168.1.2");
    // link#12 means directly attached.
    assert_eq!(lan.gateway, None);
}

#[test]
fn rows_without_local_interface_are_dropped() {
    let subnets = parse_routing_table(NETSTAT_FIXTURE, &interfaces());
    assert!(!subnets.iter().any(|s| s.interface == "utun3"));
}

#[test]
fn duplicate_cidrs_first_win() {
    let subnets = parse_routing_table(NETSTAT_FIXTURE, &interfaces());
    let count = subnets.iter().filter(|s| s.cidr == "192.168.1.0/24").count();
    assert_eq!(count, 1);
}

#[test]
fn destination_prefix_inference() {
    assert_eq!(
        parse_destination("192.168.1"),
        Some((Ipv4Addr::new(192, 168, 1, 0), 24))
    );
    assert_eq!(
        parse_destination("172.20"),
        Some((Ipv4Addr::new(172, 20, 0, 0), 16))
    );
    assert_eq!(parse_destination("10"), Some((Ipv4Addr::new(10, 0, 0, 0), 8)));
    assert_eq!(
        parse_destination("172.16.5.0/22"),
        Some((Ipv4Addr::new(172, 16, 5, 0), 22))
    );
    assert_eq!(parse_destination("not-an-ip"), None);
    assert_eq!(parse_destination("10/40"), None);
}

#[test]
fn subnet_containment_mask_math() {
    let network = Ipv4Addr::new(192, 168, 1, 0);
    assert!(ip_in_subnet(Ipv4Addr::new(192, 168, 1, 200), network, 24));
    assert!(!ip_in_subnet(Ipv4Addr::new(192, 168, 2, 1), network, 24));
    // Prefix zero matches everything.
    assert!(ip_in_subnet(Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(0, 0, 0, 0), 0));
}

#[test]
fn match_subnet_returns_first_containing() {
    let subnets = parse_routing_table(NETSTAT_FIXTURE, &interfaces());
    let found = match_subnet("192.168.1.42", &subnets).unwrap();
    assert_eq!(found.cidr, "192.168.1.0/24");
    assert!(match_subnet("8.8.8.8", &subnets).is_none());
    assert!(match_subnet("not-an-ip", &subnets).is_none());
}
