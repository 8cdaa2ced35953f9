//! Property tests for the reference engine and the in-process oracle path.

use proptest::prelude::*;
use serde_json::json;
use twinrun_oracle::prelude::*;
use twinrun_snapshot::request::{GenerationRequest, PlayerSettings};
use twinrun_snapshot::snapshot::capture_snapshot;

fn arb_player() -> impl Strategy<Value = PlayerSettings> {
    prop_oneof![
        (2i64..=8, any::<bool>()).prop_map(|(areas, shortcuts)| {
            PlayerSettings::new("Meadow Player", "Meadow")
                .with_option("area_count", json!(areas))
                .with_option("shortcuts", json!(shortcuts))
        }),
        (1i64..=6, any::<bool>()).prop_map(|(depth, lantern)| {
            PlayerSettings::new("Caverns Player", "Caverns")
                .with_option("depth", json!(depth))
                .with_option("lantern_start", json!(lantern))
                .with_option("goal", json!("random"))
        }),
    ]
}

fn arb_request() -> impl Strategy<Value = GenerationRequest> {
    (any::<u64>(), prop::collection::vec(arb_player(), 1..4)).prop_map(|(seed, players)| {
        players
            .into_iter()
            .fold(GenerationRequest::new(seed), GenerationRequest::with_player)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generation_is_repeatable_across_hosts(request in arb_request()) {
        let mut first = EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::default());
        let mut second = EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::worker());

        let a = first.generate(&request).unwrap();
        let b = second.generate(&request).unwrap();
        prop_assert_eq!(
            capture_snapshot(&a, first.catalog()).unwrap().content_hash(),
            capture_snapshot(&b, second.catalog()).unwrap().content_hash()
        );
    }

    #[test]
    fn cache_eviction_does_not_change_results(request in arb_request()) {
        let mut host = EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::default());
        let before = host.generate(&request).unwrap();
        host.evict_caches();
        let after = host.generate(&request).unwrap();
        prop_assert_eq!(
            capture_snapshot(&before, host.catalog()).unwrap().content_hash(),
            capture_snapshot(&after, host.catalog()).unwrap().content_hash()
        );
    }

    #[test]
    fn every_generated_location_holds_an_item(request in arb_request()) {
        let mut host = EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::default());
        let result = host.generate(&request).unwrap();
        for world in result.players() {
            for (_, location) in result.locations_of(world.id) {
                prop_assert!(location.item.is_some(), "{} is empty", location.name);
            }
        }
    }
}
