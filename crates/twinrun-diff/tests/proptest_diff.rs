//! Property tests for the diff engine.
//!
//! Snapshots are generated at random and compared against copies of
//! themselves (must be empty) and against permuted copies (must never
//! report content differences).

use indexmap::IndexMap;
use proptest::prelude::*;
use twinrun_diff::{compare_snapshots, FindingKind};
use twinrun_snapshot::graph::{LocationProgressType, PlayerId};
use twinrun_snapshot::snapshot::{EntranceRecord, ItemRecord, LocationRecord, WorldSnapshot};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn item_strategy() -> impl Strategy<Value = ItemRecord> {
    ("[A-F]", 1u32..3, proptest::option::of(0u64..20), 0u8..16).prop_map(
        |(name, player, code, classification)| ItemRecord {
            name,
            player: PlayerId(player),
            code,
            classification,
        },
    )
}

fn progress_strategy() -> impl Strategy<Value = LocationProgressType> {
    prop_oneof![
        Just(LocationProgressType::Default),
        Just(LocationProgressType::Priority),
        Just(LocationProgressType::Excluded),
    ]
}

fn location_strategy() -> impl Strategy<Value = LocationRecord> {
    (
        proptest::option::of(0u64..1000),
        progress_strategy(),
        proptest::option::of(item_strategy()),
    )
        .prop_map(|(address, progress_type, item)| LocationRecord {
            address,
            progress_type,
            item,
        })
}

fn player_tables() -> impl Strategy<
    Value = (
        IndexMap<String, String>,
        Vec<ItemRecord>,
        IndexMap<String, Vec<String>>,
        IndexMap<String, EntranceRecord>,
        IndexMap<String, LocationRecord>,
    ),
> {
    (
        prop::collection::btree_map("[a-d]{1,3}", "[a-z0-9]{0,4}", 0..5),
        prop::collection::vec(item_strategy(), 0..4),
        prop::collection::btree_map("R[0-9]", prop::collection::vec("L[0-9]{1,2}", 0..4), 0..4),
        prop::collection::btree_map(
            "E[0-9]",
            (
                proptest::option::of("R[0-9]"),
                proptest::option::of("R[0-9]"),
            ),
            0..4,
        ),
        prop::collection::btree_map("L[0-9]{1,2}", location_strategy(), 0..6),
    )
        .prop_map(|(options, inventory, regions, entrances, locations)| {
            (
                options.into_iter().collect(),
                inventory,
                regions.into_iter().collect(),
                entrances
                    .into_iter()
                    .map(|(name, (parent_region, connected_region))| {
                        (
                            name,
                            EntranceRecord {
                                parent_region,
                                connected_region,
                            },
                        )
                    })
                    .collect(),
                locations.into_iter().collect(),
            )
        })
}

fn snapshot_strategy() -> impl Strategy<Value = WorldSnapshot> {
    (
        prop::collection::vec(player_tables(), 1..4),
        prop::collection::vec(item_strategy(), 1..12),
    )
        .prop_map(|(players, item_pool)| {
            let mut snapshot = WorldSnapshot {
                item_pool,
                ..WorldSnapshot::default()
            };
            for (idx, (options, inventory, regions, entrances, locations)) in
                players.into_iter().enumerate()
            {
                let player = PlayerId(idx as u32 + 1);
                snapshot.options.insert(player, options);
                snapshot.start_inventory.insert(player, inventory);
                snapshot.regions.insert(player, regions);
                snapshot.entrances.insert(player, entrances);
                snapshot.locations.insert(player, locations);
            }
            snapshot
        })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn diff_against_identical_copy_is_empty(snapshot in snapshot_strategy()) {
        let copy = snapshot.clone();
        let report = compare_snapshots(&snapshot, &copy);
        prop_assert!(report.is_empty(), "unexpected findings:\n{report}");
    }

    #[test]
    fn diff_survives_a_wire_round_trip(snapshot in snapshot_strategy()) {
        let text = serde_json::to_string(&snapshot).unwrap();
        let back: WorldSnapshot = serde_json::from_str(&text).unwrap();
        let report = compare_snapshots(&snapshot, &back);
        prop_assert!(report.is_empty(), "unexpected findings:\n{report}");
    }

    #[test]
    fn reversed_item_pool_only_reports_ordering(snapshot in snapshot_strategy()) {
        let mut reversed = snapshot.clone();
        reversed.item_pool.reverse();
        let report = compare_snapshots(&snapshot, &reversed);
        prop_assert!(report.findings().all(|f| f.kind == FindingKind::Ordering));
        prop_assert!(report.finding_count() <= 1);
        if snapshot.item_pool != reversed.item_pool {
            prop_assert_eq!(report.finding_count(), 1);
        }
    }

    #[test]
    fn reversed_location_order_only_reports_ordering(snapshot in snapshot_strategy()) {
        let mut reversed = snapshot.clone();
        for locations in reversed.locations.values_mut() {
            locations.reverse();
        }
        let report = compare_snapshots(&snapshot, &reversed);
        prop_assert!(report.findings().all(|f| f.kind == FindingKind::Ordering));
        let expected = snapshot.locations.values().filter(|l| l.len() > 1).count();
        prop_assert_eq!(report.finding_count(), expected);
    }
}

#[test]
fn empty_maps_per_player_compare_equal() {
    let mut a = WorldSnapshot::default();
    a.locations.insert(PlayerId(1), IndexMap::new());
    a.regions.insert(PlayerId(1), IndexMap::new());
    let b = a.clone();
    assert!(compare_snapshots(&a, &b).is_empty());
}
