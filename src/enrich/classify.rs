use super::MdnsIndex;
use crate::model::{EntityPatch, SignalKind};
use crate::store::EntityStore;
use once_cell::sync::Lazy;
use regex::RegexBuilder;

/// One device profile: a category, a default product label, an icon key,
/// and the signals that vote for it.
struct DeviceProfile {
    category: &'static str,
    product: &'static str,
    icon: &'static str,
    vendors: &'static [&'static str],
    services: &'static [&'static str],
    hostnames: &'static [&'static str],
}

/// Profile database. Order matters: ties break toward the earlier entry.
static PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        category: "media-player",
        product: "Apple TV",
        icon: "tv",
        vendors: &["apple"],
        services: &["_airplay._tcp", "_companion-link._tcp"],
        hostnames: &["apple-?tv"],
    },
    DeviceProfile {
        category: "speaker",
        product: "HomePod",
        icon: "speaker",
        vendors: &["apple"],
        services: &["_raop._tcp"],
        hostnames: &["homepod"],
    },
    DeviceProfile {
        category: "smart-home",
        product: "Philips Hue Bridge",
        icon: "lightbulb",
        vendors: &["philips"],
        services: &["_hue._tcp"],
        hostnames: &["hue", "philips"],
    },
    DeviceProfile {
        category: "speaker",
        product: "Sonos Speaker",
        icon: "speaker",
        vendors: &["sonos"],
        services: &["_sonos._tcp", "_spotify-connect._tcp"],
        hostnames: &["sonos"],
    },
    DeviceProfile {
        category: "media-player",
        product: "Chromecast",
        icon: "cast",
        vendors: &["google"],
        services: &["_googlecast._tcp"],
        hostnames: &["chromecast"],
    },
    DeviceProfile {
        category: "speaker",
        product: "Google Home",
        icon: "speaker",
        vendors: &["google"],
        services: &[],
        hostnames: &["google-?home", "google-?nest"],
    },
    DeviceProfile {
        category: "speaker",
        product: "Amazon Echo",
        icon: "speaker",
        vendors: &["amazon"],
        services: &[],
        hostnames: &["echo", "alexa"],
    },
    DeviceProfile {
        category: "media-player",
        product: "Fire TV",
        icon: "tv",
        vendors: &["amazon"],
        services: &[],
        hostnames: &["fire-?tv", "aftv"],
    },
    DeviceProfile {
        category: "media-player",
        product: "Roku Player",
        icon: "tv",
        vendors: &["roku"],
        services: &["_roku-rcp._tcp"],
        hostnames: &["roku"],
    },
    DeviceProfile {
        category: "media-player",
        product: "Samsung TV",
        icon: "tv",
        vendors: &["samsung"],
        services: &["_airplay._tcp"],
        hostnames: &["samsung.*tv", "tizen"],
    },
    DeviceProfile {
        category: "media-player",
        product: "LG TV",
        icon: "tv",
        vendors: &["lg electronics", "lg innotek"],
        services: &[],
        hostnames: &["lgwebostv", "webos"],
    },
    DeviceProfile {
        category: "printer",
        product: "HP Printer",
        icon: "printer",
        vendors: &["hewlett", "hp inc"],
        services: &["_ipp._tcp", "_printer._tcp", "_pdl-datastream._tcp"],
        hostnames: &["^hp", "officejet", "laserjet"],
    },
    DeviceProfile {
        category: "printer",
        product: "Canon Printer",
        icon: "printer",
        vendors: &["canon"],
        services: &["_ipp._tcp", "_printer._tcp"],
        hostnames: &["canon"],
    },
    DeviceProfile {
        category: "printer",
        product: "Epson Printer",
        icon: "printer",
        vendors: &["epson", "seiko epson"],
        services: &["_ipp._tcp", "_printer._tcp"],
        hostnames: &["epson"],
    },
    DeviceProfile {
        category: "printer",
        product: "Brother Printer",
        icon: "printer",
        vendors: &["brother industries"],
        services: &["_ipp._tcp", "_printer._tcp"],
        hostnames: &["brother"],
    },
    DeviceProfile {
        category: "storage",
        product: "Synology NAS",
        icon: "server",
        vendors: &["synology"],
        services: &["_smb._tcp", "_afpovertcp._tcp"],
        hostnames: &["synology", "diskstation"],
    },
    DeviceProfile {
        category: "storage",
        product: "QNAP NAS",
        icon: "server",
        vendors: &["qnap"],
        services: &["_smb._tcp"],
        hostnames: &["qnap"],
    },
    DeviceProfile {
        category: "router",
        product: "UniFi Gateway",
        icon: "router",
        vendors: &["ubiquiti"],
        services: &[],
        hostnames: &["unifi", "ubnt"],
    },
    DeviceProfile {
        category: "router",
        product: "Wi-Fi Router",
        icon: "router",
        vendors: &["netgear", "tp-link", "linksys", "d-link", "asustek"],
        services: &[],
        hostnames: &["router", "gateway"],
    },
    DeviceProfile {
        category: "smart-home",
        product: "Nest Device",
        icon: "thermostat",
        vendors: &["nest labs"],
        services: &[],
        hostnames: &["nest"],
    },
    DeviceProfile {
        category: "camera",
        product: "Ring Camera",
        icon: "camera",
        vendors: &["ring llc"],
        services: &[],
        hostnames: &["ring-"],
    },
    DeviceProfile {
        category: "smart-home",
        product: "Kasa Smart Device",
        icon: "plug",
        vendors: &["tp-link"],
        services: &[],
        hostnames: &["^hs\\d{3}", "kasa"],
    },
    DeviceProfile {
        category: "smart-home",
        product: "ESP Device",
        icon: "chip",
        vendors: &["espressif"],
        services: &[],
        hostnames: &["^esp[-_]?", "tasmota", "shelly"],
    },
    DeviceProfile {
        category: "game-console",
        product: "PlayStation",
        icon: "gamepad",
        vendors: &["sony interactive"],
        services: &[],
        hostnames: &["ps4", "ps5", "playstation"],
    },
    DeviceProfile {
        category: "game-console",
        product: "Xbox",
        icon: "gamepad",
        vendors: &["microsoft"],
        services: &[],
        hostnames: &["xbox"],
    },
    DeviceProfile {
        category: "server",
        product: "Raspberry Pi",
        icon: "chip",
        vendors: &["raspberry pi"],
        services: &["_ssh._tcp", "_workstation._tcp"],
        hostnames: &["raspberrypi", "^pi\\b"],
    },
];

struct CompiledProfile {
    profile: &'static DeviceProfile,
    hostnames: Vec<regex::Regex>,
}

static COMPILED: Lazy<Vec<CompiledProfile>> = Lazy::new(|| {
    PROFILES
        .iter()
        .map(|profile| CompiledProfile {
            profile,
            hostnames: profile
                .hostnames
                .iter()
                .filter_map(|pattern| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .ok()
                })
                .collect(),
        })
        .collect()
});

/// Score every profile against each unclassified LAN entity and emit the
/// winning patch. Patches go through the lifecycle-safe path only.
pub fn classify(store: &EntityStore) -> Vec<(String, EntityPatch)> {
    let index = MdnsIndex::build(store);
    let mut patches = Vec::new();

    for entity in store.iter_entities() {
        let SignalKind::Lan {
            vendor,
            device_type,
            ..
        } = &entity.kind
        else {
            continue;
        };
        if device_type.is_some() {
            continue;
        }

        let ip = entity.ip.as_deref();
        let services_here = ip.and_then(|ip| index.service_types_at_ip.get(ip));
        let mdns_name = ip.and_then(|ip| index.first_service_name_at_ip.get(ip));

        let mut best: Option<(u32, &CompiledProfile)> = None;
        for compiled in COMPILED.iter() {
            let mut score = 0u32;
            if let Some(vendor) = vendor {
                let vendor_lower = vendor.to_lowercase();
                if compiled
                    .profile
                    .vendors
                    .iter()
                    .any(|pattern| vendor_lower.contains(pattern))
                {
                    score += 1;
                }
            }
            if let Some(services) = services_here {
                if compiled
                    .profile
                    .services
                    .iter()
                    .any(|service| services.contains(*service))
                {
                    score += 1;
                }
            }
            if compiled.hostnames.iter().any(|re| re.is_match(&entity.name)) {
                score += 1;
            }
            // Strictly positive, first-in-file wins ties.
            if score > 0 && best.map_or(true, |(top, _)| score > top) {
                best = Some((score, compiled));
            }
        }

        if let Some((_, winner)) = best {
            let product = mdns_name
                .cloned()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| winner.profile.product.to_string());
            patches.push((
                entity.id.clone(),
                EntityPatch {
                    device_type: Some(winner.profile.category.to_string()),
                    product_name: Some(product),
                    icon_key: Some(winner.profile.icon.to_string()),
                    ..EntityPatch::default()
                },
            ));
        }
    }
    patches
}
