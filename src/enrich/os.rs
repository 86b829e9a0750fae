use super::MdnsIndex;
use crate::model::{Entity, EntityPatch, SignalKind};
use crate::store::EntityStore;
use once_cell::sync::Lazy;
use regex::RegexBuilder;
use std::collections::HashMap;

/// Entities already fingerprinted at or above this confidence are left alone.
const SETTLED_CONFIDENCE: f64 = 0.85;
/// Inference results below this floor are discarded.
const MIN_CONFIDENCE: f64 = 0.45;

const WEIGHT_TTL: f64 = 0.3;
const WEIGHT_VENDOR: f64 = 0.4;
const WEIGHT_HOSTNAME: f64 = 0.5;
const WEIGHT_MDNS: f64 = 0.5;
const WEIGHT_BLUETOOTH: f64 = 0.5;
const WEIGHT_PROBE: f64 = 0.9;

struct OsProfile {
    family: &'static str,
    ttl_range: Option<(u8, u8)>,
    vendors: &'static [&'static str],
    hostnames: &'static [&'static str],
    services: &'static [&'static str],
    bluetooth_names: &'static [&'static str],
}

static PROFILES: &[OsProfile] = &[
    OsProfile {
        family: "macos",
        ttl_range: Some((60, 64)),
        vendors: &["apple"],
        hostnames: &["macbook", "imac", "mac-?mini", "mac-?pro", "macstudio"],
        services: &["_companion-link._tcp", "_afpovertcp._tcp", "_rdlink._tcp"],
        bluetooth_names: &["macbook", "imac"],
    },
    OsProfile {
        family: "ios",
        ttl_range: Some((60, 64)),
        vendors: &["apple"],
        hostnames: &["iphone", "ipad", "ipod"],
        services: &["_apple-mobdev2._tcp"],
        bluetooth_names: &["iphone", "ipad", "airpods", "apple watch"],
    },
    OsProfile {
        family: "windows",
        ttl_range: Some((120, 128)),
        vendors: &["microsoft", "dell", "lenovo", "hewlett-packard"],
        hostnames: &["desktop-", "laptop-", "windows"],
        services: &["_smb._tcp"],
        bluetooth_names: &["surface"],
    },
    OsProfile {
        family: "android",
        ttl_range: Some((60, 64)),
        vendors: &["samsung", "xiaomi", "oneplus", "huawei", "oppo"],
        hostnames: &["android", "galaxy", "pixel"],
        services: &[],
        bluetooth_names: &["galaxy", "pixel", "buds"],
    },
    OsProfile {
        family: "linux",
        ttl_range: Some((60, 64)),
        vendors: &["raspberry pi", "espressif", "intel"],
        hostnames: &["raspberrypi", "ubuntu", "debian", "-server", "^nas\\b"],
        services: &["_workstation._tcp", "_sftp-ssh._tcp"],
        bluetooth_names: &[],
    },
    OsProfile {
        family: "freebsd",
        ttl_range: Some((255, 255)),
        vendors: &[],
        hostnames: &["freebsd", "pfsense", "opnsense"],
        services: &[],
        bluetooth_names: &[],
    },
];

struct CompiledOsProfile {
    profile: &'static OsProfile,
    hostnames: Vec<regex::Regex>,
    bluetooth_names: Vec<regex::Regex>,
}

fn compile(patterns: &[&str]) -> Vec<regex::Regex> {
    patterns
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
}

static COMPILED: Lazy<Vec<CompiledOsProfile>> = Lazy::new(|| {
    PROFILES
        .iter()
        .map(|profile| CompiledOsProfile {
            profile,
            hostnames: compile(profile.hostnames),
            bluetooth_names: compile(profile.bluetooth_names),
        })
        .collect()
});

/// External signals the fingerprinter consults beyond the store itself.
pub struct FingerprintContext<'a> {
    /// Lower-median of the rolling TTL window for an IP, when capturing.
    pub ttl_median: &'a dyn Fn(&str) -> Option<u8>,
    /// Families confirmed by on-demand probes, keyed by IP.
    pub probe_families: &'a HashMap<String, String>,
}

impl<'a> FingerprintContext<'a> {
    pub fn without_capture(probe_families: &'a HashMap<String, String>) -> Self {
        static NO_TTL: fn(&str) -> Option<u8> = |_| None;
        Self {
            ttl_median: &NO_TTL,
            probe_families,
        }
    }
}

/// Weighted multi-signal OS inference over LAN and Bluetooth entities.
/// Returns lifecycle-safe patches; entities already settled are skipped.
pub fn fingerprint(store: &EntityStore, ctx: &FingerprintContext) -> Vec<(String, EntityPatch)> {
    let index = MdnsIndex::build(store);
    let mut patches = Vec::new();

    for entity in store.iter_entities() {
        let eligible = matches!(
            entity.kind,
            SignalKind::Lan { .. } | SignalKind::Bluetooth { .. }
        );
        if !eligible {
            continue;
        }
        if entity
            .os_fingerprint_confidence
            .is_some_and(|c| c >= SETTLED_CONFIDENCE)
        {
            continue;
        }

        let mut sums: HashMap<&'static str, f64> = HashMap::new();
        for compiled in COMPILED.iter() {
            let weight = score_profile(entity, compiled, &index, ctx);
            if weight > 0.0 {
                *sums.entry(compiled.profile.family).or_insert(0.0) += weight;
            }
        }

        let Some((family, sum)) = sums
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        let confidence = sum.min(1.0);
        if confidence < MIN_CONFIDENCE {
            continue;
        }

        patches.push((
            entity.id.clone(),
            EntityPatch {
                os_family: Some(family.to_string()),
                device_category: Some(derive_category(entity, family).to_string()),
                os_fingerprint_confidence: Some(confidence),
                ..EntityPatch::default()
            },
        ));
    }
    patches
}

fn score_profile(
    entity: &Entity,
    compiled: &CompiledOsProfile,
    index: &MdnsIndex,
    ctx: &FingerprintContext,
) -> f64 {
    let profile = compiled.profile;
    let mut sum = 0.0;

    if let (Some(ip), Some((low, high))) = (entity.ip.as_deref(), profile.ttl_range) {
        if let Some(median) = (ctx.ttl_median)(ip) {
            if median >= low && median <= high {
                sum += WEIGHT_TTL;
            }
        }
    }

    let vendor = match &entity.kind {
        SignalKind::Lan { vendor, .. } => vendor.as_deref(),
        _ => None,
    };
    if let Some(vendor) = vendor {
        let vendor_lower = vendor.to_lowercase();
        if profile.vendors.iter().any(|v| vendor_lower.contains(v)) {
            sum += WEIGHT_VENDOR;
        }
    }

    if compiled.hostnames.iter().any(|re| re.is_match(&entity.name)) {
        sum += WEIGHT_HOSTNAME;
    }

    if let Some(ip) = entity.ip.as_deref() {
        if let Some(services) = index.service_types_at_ip.get(ip) {
            let fired = profile.services.iter().any(|service| {
                let core = service.trim_start_matches('_').trim_end_matches("._tcp");
                services.iter().any(|s| s.contains(core))
            });
            if fired {
                sum += WEIGHT_MDNS;
            }
        }
    }

    if matches!(entity.kind, SignalKind::Bluetooth { .. })
        && compiled
            .bluetooth_names
            .iter()
            .any(|re| re.is_match(&entity.name))
    {
        sum += WEIGHT_BLUETOOTH;
    }

    if let Some(ip) = entity.ip.as_deref() {
        if ctx.probe_families.get(ip).map(String::as_str) == Some(profile.family) {
            sum += WEIGHT_PROBE;
        }
    }

    sum
}

/// Device category: Bluetooth minor type first, then the classifier's
/// category, then the OS family.
pub fn derive_category(entity: &Entity, family: &str) -> &'static str {
    if let SignalKind::Bluetooth {
        minor_type: Some(minor),
        ..
    } = &entity.kind
    {
        let minor = minor.to_lowercase();
        if minor.contains("phone") || minor.contains("smartphone") {
            return "mobile";
        }
        if minor.contains("laptop") || minor.contains("notebook") {
            return "laptop";
        }
        if minor.contains("desktop") || minor.contains("computer") {
            return "desktop";
        }
        if minor.contains("audio") || minor.contains("speaker") || minor.contains("headphone") {
            return "iot";
        }
    }

    let classified = match &entity.kind {
        SignalKind::Lan { device_type, .. } => device_type.as_deref(),
        _ => None,
    };
    if let Some(category) = classified {
        match category {
            "computer" => {
                return if family == "ios" || family == "android" {
                    "mobile"
                } else {
                    "desktop"
                };
            }
            "server" => return "server",
            "smart-home" | "speaker" | "media-player" | "camera" => return "iot",
            "storage" => return "server",
            "router" => return "embedded",
            _ => {}
        }
    }

    match family {
        "ios" | "android" => "mobile",
        "macos" | "windows" => "desktop",
        "linux" | "freebsd" => "server",
        _ => "unknown",
    }
}
