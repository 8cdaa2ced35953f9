//! Property tests for the snapshot serializer.

use proptest::prelude::*;
use twinrun_snapshot::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Shape of one player world: locations per region, and for each location
/// whether an item is placed there.
type PlayerShape = Vec<Vec<bool>>;

fn shape_strategy() -> impl Strategy<Value = (u64, Vec<PlayerShape>)> {
    (
        any::<u64>(),
        prop::collection::vec(
            prop::collection::vec(prop::collection::vec(any::<bool>(), 0..5), 1..5),
            1..4,
        ),
    )
}

fn catalog() -> GeneratorCatalog {
    let mut catalog = GeneratorCatalog::new();
    catalog.register(WorldDescriptor::new("Meadow", ["goal", "size"]));
    catalog
}

fn build(seed: u64, shape: &[PlayerShape]) -> GenerationResult {
    let mut result = GenerationResult::new(seed);
    for (p, regions) in shape.iter().enumerate() {
        let player = result.add_player(PlayerId(p as u32 + 1), format!("P{p}"), "Meadow");
        let world = result.player_mut(player).unwrap();
        world.set_option("goal", serde_json::json!(1), "boss");
        world.set_option("size", serde_json::json!(regions.len()), regions.len().to_string());

        let menu = result.add_region(player, "Menu");
        for (r, locations) in regions.iter().enumerate() {
            let region = result.add_region(player, format!("Area {r}"));
            result.connect(player, format!("Menu -> Area {r}"), Some(menu), Some(region));
            for (l, &filled) in locations.iter().enumerate() {
                let address = (r * 100 + l) as u64;
                let loc = result.add_location(
                    region,
                    format!("Area {r} Chest {l}"),
                    Some(address),
                    LocationProgressType::Default,
                );
                let item = Item::new(
                    format!("Item {r}.{l}"),
                    player,
                    Some(address),
                    ItemClassification::PROGRESSION,
                );
                result.item_pool.push(item.clone());
                if filled {
                    result.place_item(loc, item);
                }
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn capture_is_repeatable_and_leaves_input_untouched((seed, shape) in shape_strategy()) {
        let result = build(seed, &shape);
        let before = format!("{result:?}");

        let first = capture_snapshot(&result, &catalog()).unwrap();
        let second = capture_snapshot(&result, &catalog()).unwrap();

        prop_assert_eq!(format!("{result:?}"), before);
        prop_assert_eq!(first.content_hash(), second.content_hash());
        prop_assert_eq!(first.location_count(), result.location_count());
    }

    #[test]
    fn content_hash_survives_a_json_round_trip((seed, shape) in shape_strategy()) {
        let snapshot = capture_snapshot(&build(seed, &shape), &catalog()).unwrap();
        let text = serde_json::to_string(&snapshot).unwrap();
        let back: WorldSnapshot = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(snapshot.content_hash(), back.content_hash());
    }

    #[test]
    fn option_prefix_is_game_then_name((seed, shape) in shape_strategy()) {
        let snapshot = capture_snapshot(&build(seed, &shape), &catalog()).unwrap();
        for options in snapshot.options.values() {
            let keys: Vec<&str> = options.keys().map(String::as_str).collect();
            prop_assert_eq!(keys, vec!["Game", "Name", "goal", "size"]);
        }
    }
}
