use crate::model::SignalKind;
use crate::store::EntityStore;
use std::collections::{HashMap, HashSet};

// Submodule declarations
pub mod classify;
pub mod os;
pub mod probe;

/// mDNS-derived lookup indices keyed by IP, rebuilt from the current store
/// before each enrichment pass.
#[derive(Debug, Default)]
pub struct MdnsIndex {
    pub service_types_at_ip: HashMap<String, HashSet<String>>,
    pub first_service_name_at_ip: HashMap<String, String>,
}

impl MdnsIndex {
    pub fn build(store: &EntityStore) -> Self {
        let mut index = MdnsIndex::default();
        for entity in store.iter_entities() {
            let SignalKind::Mdns { service_type, .. } = &entity.kind else {
                continue;
            };
            let Some(ip) = &entity.ip else { continue };
            index
                .service_types_at_ip
                .entry(ip.clone())
                .or_default()
                .insert(service_type.clone());
            index
                .first_service_name_at_ip
                .entry(ip.clone())
                .or_insert_with(|| strip_parenthetical(&entity.name));
        }
        index
    }
}

/// `Living Room (2)` → `Living Room`
pub fn strip_parenthetical(name: &str) -> String {
    match name.rfind('(') {
        Some(idx) => name[..idx].trim_end().to_string(),
        None => name.trim().to_string(),
    }
}
