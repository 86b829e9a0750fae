use crate::constants::BUILTIN_OUI;
use crate::errors::DiscoveryError;
use ::oui::OuiDatabase;
use eui48::MacAddress;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// OUI (Organizationally Unique Identifier) database for MAC address vendor lookup
pub mod vendor {
    use super::*;

    /// Global OUI database instance, loaded lazily on first use
    static OUI_DB: OnceCell<Arc<OuiDatabase>> = OnceCell::new();

    /// MAC address vendor database keyed by the three-octet prefix,
    /// with a per-process result cache.
    pub struct MacVendorDatabase {
        prefix_cache: HashMap<String, Option<String>>,
    }

    impl MacVendorDatabase {
        /// Create a new vendor database instance.
        /// The actual OUI database is loaded lazily on first lookup.
        pub fn new() -> Result<Self, DiscoveryError> {
            Ok(Self {
                prefix_cache: HashMap::new(),
            })
        }

        /// Look up the vendor for a MAC address. Lookups key on the
        /// uppercased first three octets; the full address is only used to
        /// satisfy the OUI database query shape.
        pub fn lookup_vendor(&mut self, mac: &str) -> Option<String> {
            let normalized = normalize_mac(mac)?;
            let prefix = normalized[..8].to_uppercase();

            if let Some(cached) = self.prefix_cache.get(&prefix) {
                return cached.clone();
            }

            let db = OUI_DB.get_or_init(|| {
                Arc::new(OuiDatabase::new_from_file("manuf.txt").unwrap_or_else(|_| {
                    tracing::debug!("manuf.txt unavailable, using built-in OUI fallback");
                    OuiDatabase::new_from_str(BUILTIN_OUI).expect("built-in OUI is valid")
                }))
            });

            let result = MacAddress::parse_str(&normalized.to_uppercase())
                .ok()
                .and_then(|addr| db.query_by_mac(&addr).ok().flatten())
                .and_then(|entry| entry.name_long.clone());

            self.prefix_cache.insert(prefix, result.clone());
            result
        }
    }

    /// Normalize a MAC address to colon-separated two-digit lowercase form
    /// (`aa:bb:cc:dd:ee:ff`). Accepts single-digit octets (as the neighbor
    /// table prints them), dash/dot separators, and raw hex strings.
    pub fn normalize_mac(mac: &str) -> Option<String> {
        let clean = mac.replace('-', ":").replace('.', ":");
        let parts: Vec<&str> = clean.split(':').collect();

        if parts.len() == 6 && parts.iter().all(|p| !p.is_empty() && p.len() <= 2) {
            let octets: Vec<String> = parts
                .iter()
                .map(|p| {
                    u8::from_str_radix(p, 16)
                        .ok()
                        .map(|o| format!("{:02x}", o))
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(octets.join(":"));
        }

        if clean.len() == 12 && clean.chars().all(|c| c.is_ascii_hexdigit()) {
            let lower = clean.to_lowercase();
            let mut buf = String::with_capacity(17);
            for (i, chunk) in lower.as_bytes().chunks(2).enumerate() {
                if i > 0 {
                    buf.push(':');
                }
                buf.push_str(&String::from_utf8_lossy(chunk));
            }
            return Some(buf);
        }

        None
    }
}
