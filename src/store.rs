use crate::config::LifecycleConfig;
use crate::model::{Entity, EntityPatch, EntityStatus, Millis, Relation, SignalKind};
use std::collections::BTreeMap;

/// Result of a lifecycle tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    pub removed: Vec<String>,
    pub status_changed: bool,
}

impl TickOutcome {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && !self.status_changed
    }
}

/// Keyed in-memory store for entities and relations.
///
/// Ordered maps keep snapshot output deterministic: identical store content
/// always encodes to identical payloads. The store is only ever touched from
/// the engine's writer context, so it carries no locking of its own.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: BTreeMap<String, Entity>,
    relations: BTreeMap<String, Relation>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fresh observation. An existing entity keeps its `firstSeen`,
    /// gets `lastSeen` bumped to `now`, and is forced back to `active`.
    pub fn upsert(&mut self, incoming: Entity, now: Millis) {
        match self.entities.get_mut(&incoming.id) {
            Some(existing) => {
                existing.merge_observation(incoming);
                existing.last_seen = now;
                existing.status = EntityStatus::Active;
            }
            None => {
                let mut entity = incoming;
                entity.first_seen = now;
                entity.last_seen = now;
                entity.status = EntityStatus::Active;
                self.entities.insert(entity.id.clone(), entity);
            }
        }
    }

    /// Apply an enrichment patch without touching `lastSeen` or `status`.
    /// No-op when the id is absent. Returns whether anything was written.
    pub fn patch(&mut self, id: &str, patch: EntityPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        if let SignalKind::Lan {
            device_type,
            product_name,
            icon_key,
            ..
        } = &mut entity.kind
        {
            if patch.device_type.is_some() {
                *device_type = patch.device_type;
            }
            if patch.product_name.is_some() {
                *product_name = patch.product_name;
            }
            if patch.icon_key.is_some() {
                *icon_key = patch.icon_key;
            }
        }
        if patch.os_family.is_some() {
            entity.os_family = patch.os_family;
        }
        if patch.os_version.is_some() {
            entity.os_version = patch.os_version;
        }
        if patch.device_category.is_some() {
            entity.device_category = patch.device_category;
        }
        if patch.os_fingerprint_confidence.is_some() {
            entity.os_fingerprint_confidence = patch.os_fingerprint_confidence;
        }
        if patch.protocols.is_some() {
            entity.protocols = patch.protocols;
        }
        if patch.total_bytes.is_some() {
            entity.total_bytes = patch.total_bytes;
        }
        if patch.total_packets.is_some() {
            entity.total_packets = patch.total_packets;
        }
        true
    }

    /// Insert or replace a relation by id.
    pub fn upsert_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.id.clone(), relation);
    }

    /// Remove every relation whose source or target is `id`.
    pub fn prune_relations_of(&mut self, id: &str) {
        self.relations.retain(|_, r| r.source != id && r.target != id);
    }

    /// Advance lifecycle status as a function of age. The Host never
    /// transitions. Removal deletes the entity and prunes its relations in
    /// the same step.
    pub fn tick(&mut self, now: Millis, thresholds: &LifecycleConfig) -> TickOutcome {
        let stale = thresholds.stale_after.as_millis() as Millis;
        let expired = thresholds.expired_after.as_millis() as Millis;
        let remove = thresholds.remove_after.as_millis() as Millis;

        let mut outcome = TickOutcome::default();
        let mut doomed = Vec::new();

        for entity in self.entities.values_mut() {
            if entity.kind.is_host() {
                continue;
            }
            let age = now - entity.last_seen;
            if age > remove {
                doomed.push(entity.id.clone());
            } else if age > expired {
                if entity.status != EntityStatus::Expired {
                    entity.status = EntityStatus::Expired;
                    outcome.status_changed = true;
                }
            } else if age > stale
                && !matches!(entity.status, EntityStatus::Stale | EntityStatus::Expired)
            {
                entity.status = EntityStatus::Stale;
                outcome.status_changed = true;
            }
        }

        for id in doomed {
            self.entities.remove(&id);
            self.prune_relations_of(&id);
            outcome.removed.push(id);
        }

        outcome
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ordered copy of all entities.
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    /// Ordered copy of all relations.
    pub fn relations(&self) -> Vec<Relation> {
        self.relations.values().cloned().collect()
    }

    pub fn iter_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}
