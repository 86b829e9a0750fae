use netscope::enrich::classify::classify;
use netscope::model::{EntityPatch, SignalKind};
use test_utils::{lan_entity, mdns_entity, seeded_store};


const T0: i64 = 1000;

#[test]
fn vendor_plus_service_classifies_hue_bridge() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity(
            "00:17:88:aa:bb:cc",
            "192.168.1.50",
            Some("Philips Electronics Nederland BV"),
        ),
        T0,
    );
    store.upsert(mdns_entity("_hue._tcp", "Hue Bridge (2)", "192.168.1.50"), T0);

    let before_seen = store.get("lan-00:17:88:aa:bb:cc").unwrap().last_seen;
    let patches = classify(&store);
    assert_eq!(patches.len(), 1);
    let (id, patch) = &patches[0];
    assert_eq!(id, "lan-00:17:88:aa:bb:cc");
    assert_eq!(patch.device_type.as_deref(), Some("smart-home"));
    assert_eq!(patch.icon_key.as_deref(), Some("lightbulb"));
    // The mDNS display name wins over the profile default, suffix stripped.
    assert_eq!(patch.product_name.as_deref(), Some("Hue Bridge"));

    for (id, patch) in patches {
        store.patch(&id, patch);
    }
    assert_eq!(
        store.get("lan-00:17:88:aa:bb:cc").unwrap().last_seen,
        before_seen
    );
}

#[test]
fn profile_default_product_used_without_mdns_name() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("5c:aa:fd:00:11:22", "192.168.1.60", Some("Sonos, Inc.")),
        T0,
    );

    let patches = classify(&store);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].1.device_type.as_deref(), Some("speaker"));
    assert_eq!(patches[0].1.product_name.as_deref(), Some("Sonos Speaker"));
}

#[test]
fn zero_score_yields_no_patch() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("00:11:22:33:44:55", "192.168.1.70", Some("Obscure Vendor Ltd")),
        T0,
    );
    assert!(classify(&store).is_empty());
}

#[test]
fn already_classified_entities_are_skipped() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("5c:aa:fd:00:11:22", "192.168.1.60", Some("Sonos, Inc.")),
        T0,
    );
    for (id, patch) in classify(&store) {
        store.patch(&id, patch);
    }
    // A second run has nothing left to classify.
    assert!(classify(&store).is_empty());
}

#[test]
fn hostname_pattern_alone_scores() {
    let mut store = seeded_store("192.168.1.2");
    let mut entity = lan_entity("dc:a6:32:00:11:22", "192.168.1.80", None);
    entity.name = "raspberrypi".to_string();
    store.upsert(entity, T0);

    let patches = classify(&store);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].1.device_type.as_deref(), Some("server"));
}

#[test]
fn service_index_only_counts_same_ip() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("00:17:88:aa:bb:cc", "192.168.1.50", Some("Unknown Maker")),
        T0,
    );
    // Hue service lives at a different address; no vote for this entity.
    store.upsert(mdns_entity("_hue._tcp", "Hue Bridge", "192.168.1.99"), T0);
    assert!(classify(&store).is_empty());
}

#[test]
fn classifier_patch_is_lifecycle_safe_in_store() {
    let mut store = seeded_store("192.168.1.2");
    store.upsert(
        lan_entity("5c:aa:fd:00:11:22", "192.168.1.60", Some("Sonos, Inc.")),
        T0,
    );
    let before = store.get("lan-5c:aa:fd:00:11:22").unwrap().clone();
    store.patch(
        "lan-5c:aa:fd:00:11:22",
        EntityPatch {
            device_type: Some("speaker".to_string()),
            ..EntityPatch::default()
        },
    );
    let after = store.get("lan-5c:aa:fd:00:11:22").unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.last_seen, before.last_seen);
    match &after.kind {
        SignalKind::Lan { device_type, .. } => assert_eq!(device_type.as_deref(), Some("speaker")),
        other => panic!("unexpected kind {:?}", other),
    }
}
