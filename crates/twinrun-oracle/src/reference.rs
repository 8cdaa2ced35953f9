//! Reference generation engine.
//!
//! A small seeded multiworld generator with two games, `Meadow` and
//! `Caverns`. It is deterministic for a given request unless a request asks
//! it not to be, which makes it the test subject for the oracle:
//!
//! | engine setting           | effect                                        |
//! |--------------------------|-----------------------------------------------|
//! | `salt_with_process_id`   | mixes the process id into the seed            |
//! | `stall_ms`               | sleeps before generating                      |
//! | `panic_message`          | panics with the given message                 |
//! | `use_legacy_settings`    | reads host settings through `get_settings`    |
//! | `use_legacy_options`     | reads player defaults through `get_options`   |
//!
//! Every player also accepts an `isolated_region` toggle that adds a region
//! nothing connects to, so generation fails its connectivity check.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_json::{json, Value};
use twinrun_snapshot::catalog::{GeneratorCatalog, WorldDescriptor};
use twinrun_snapshot::graph::{
    GenerationResult, Item, ItemClassification, LocationId, LocationProgressType, PlayerId,
    RegionId,
};
use twinrun_snapshot::request::{GenerationRequest, PlayerSettings};
use twinrun_worker::cache::{CacheRegistry, EvictableCache};
use twinrun_worker::engine::{EngineContext, GenerationEngine};
use twinrun_worker::legacy::{LegacyEntryPoints, INIT_LOGGING};

/// Locator of this engine in [`crate::engine_registry`].
pub const LOCATOR: &str = "reference";

// ---------------------------------------------------------------------------
// Game tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum OptionKind {
    /// Named choices; the first is the default.
    Choice(&'static [&'static str]),
    Range { min: i64, max: i64, default: i64 },
    Toggle,
}

#[derive(Debug, Clone, Copy)]
struct OptionSpec {
    key: &'static str,
    kind: OptionKind,
}

#[derive(Debug)]
struct GameSpec {
    name: &'static str,
    /// Declared options, in declaration order.
    options: &'static [OptionSpec],
    /// Stems for area names.
    areas: &'static [&'static str],
    progression: &'static [&'static str],
    useful: &'static [&'static str],
    filler: &'static [&'static str],
    /// First item code and location address of this game.
    code_base: u64,
}

const ISOLATED_REGION: OptionSpec = OptionSpec {
    key: "isolated_region",
    kind: OptionKind::Toggle,
};

const MEADOW: GameSpec = GameSpec {
    name: "Meadow",
    options: &[
        OptionSpec {
            key: "goal",
            kind: OptionKind::Choice(&["bloom", "harvest", "gardener"]),
        },
        OptionSpec {
            key: "area_count",
            kind: OptionKind::Range {
                min: 2,
                max: 8,
                default: 3,
            },
        },
        OptionSpec {
            key: "shortcuts",
            kind: OptionKind::Toggle,
        },
        ISOLATED_REGION,
    ],
    areas: &["Orchard", "Pond", "Hedge Maze", "Windmill", "Beehives"],
    progression: &["Trowel", "Watering Can", "Gate Key"],
    useful: &["Seed Pouch"],
    filler: &["Clover", "Pebble"],
    code_base: 10_000,
};

const CAVERNS: GameSpec = GameSpec {
    name: "Caverns",
    options: &[
        OptionSpec {
            key: "goal",
            kind: OptionKind::Choice(&["depths", "treasure"]),
        },
        OptionSpec {
            key: "depth",
            kind: OptionKind::Range {
                min: 1,
                max: 6,
                default: 2,
            },
        },
        OptionSpec {
            key: "lantern_start",
            kind: OptionKind::Toggle,
        },
        ISOLATED_REGION,
    ],
    areas: &["Grotto", "Crystal Hall", "Flooded Shaft", "Bone Pit"],
    progression: &["Rope", "Pickaxe", "Lantern"],
    useful: &["Map Fragment"],
    filler: &["Glowworm", "Rubble"],
    code_base: 20_000,
};

const GAMES: &[&GameSpec] = &[&MEADOW, &CAVERNS];

fn game_spec(name: &str) -> Option<&'static GameSpec> {
    GAMES.iter().copied().find(|g| g.name == name)
}

// ---------------------------------------------------------------------------
// Option resolution
// ---------------------------------------------------------------------------

/// Resolve one option to `(raw, canonical)`. `"random"` rolls with `rng`.
fn resolve_option(
    spec: &OptionSpec,
    value: Option<&Value>,
    rng: &mut Pcg64,
) -> anyhow::Result<(Value, String)> {
    let invalid = || {
        anyhow::anyhow!(
            "invalid value {} for option '{}'",
            value.map_or_else(|| "null".to_owned(), Value::to_string),
            spec.key
        )
    };

    match (spec.kind, value) {
        (OptionKind::Choice(choices), None) => Ok((json!(0), choices[0].to_owned())),
        (OptionKind::Choice(choices), Some(Value::String(s))) if s == "random" => {
            let index = rng.gen_range(0..choices.len());
            Ok((json!(index), choices[index].to_owned()))
        }
        (OptionKind::Choice(choices), Some(Value::String(s))) => choices
            .iter()
            .position(|c| c.eq_ignore_ascii_case(s))
            .map(|index| (json!(index), choices[index].to_owned()))
            .ok_or_else(invalid),
        (OptionKind::Choice(choices), Some(Value::Number(n))) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < choices.len())
            .map(|index| (json!(index), choices[index].to_owned()))
            .ok_or_else(invalid),
        (OptionKind::Choice(_), Some(_)) => Err(invalid()),

        (OptionKind::Range { default, .. }, None) => Ok((json!(default), default.to_string())),
        (OptionKind::Range { min, max, .. }, Some(Value::String(s))) if s == "random" => {
            let n = rng.gen_range(min..=max);
            Ok((json!(n), n.to_string()))
        }
        (OptionKind::Range { min, max, .. }, Some(v)) => v
            .as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            .filter(|n| (min..=max).contains(n))
            .map(|n| (json!(n), n.to_string()))
            .ok_or_else(invalid),

        (OptionKind::Toggle, None) => Ok((json!(false), "false".to_owned())),
        (OptionKind::Toggle, Some(v)) => {
            let on = match v {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => match n.as_u64() {
                    Some(0) => Some(false),
                    Some(1) => Some(true),
                    _ => None,
                },
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "on" => Some(true),
                    "false" | "off" => Some(false),
                    _ => None,
                },
                _ => None,
            }
            .ok_or_else(invalid)?;
            // Raw stays whatever the caller sent; only the canonical form is
            // normalized.
            Ok((v.clone(), on.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// LayoutCache
// ---------------------------------------------------------------------------

/// Memoized area names per `(game, index)`.
#[derive(Debug, Default)]
pub struct LayoutCache {
    names: Mutex<HashMap<(&'static str, usize), String>>,
}

impl LayoutCache {
    fn area_name(&self, game: &'static GameSpec, index: usize) -> String {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        names
            .entry((game.name, index))
            .or_insert_with(|| {
                let stem = game.areas[index % game.areas.len()];
                match index / game.areas.len() {
                    0 => stem.to_owned(),
                    lap => format!("{stem} {}", lap + 1),
                }
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvictableCache for LayoutCache {
    fn name(&self) -> &str {
        "reference-layouts"
    }

    fn evict(&self) -> usize {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = names.len();
        names.clear();
        dropped
    }
}

// ---------------------------------------------------------------------------
// ReferenceEngine
// ---------------------------------------------------------------------------

/// The reference engine.
#[derive(Debug)]
pub struct ReferenceEngine {
    catalog: GeneratorCatalog,
    layouts: Arc<LayoutCache>,
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceEngine {
    pub fn new() -> Self {
        let mut catalog = GeneratorCatalog::new();
        for game in GAMES {
            catalog.register(WorldDescriptor::new(
                game.name,
                game.options.iter().map(|o| o.key),
            ));
        }
        Self {
            catalog,
            layouts: Arc::new(LayoutCache::default()),
        }
    }

    /// Factory for [`twinrun_worker::engine::EngineRegistry`].
    pub fn boxed() -> Box<dyn GenerationEngine> {
        Box::new(Self::new())
    }

    pub fn layouts(&self) -> &LayoutCache {
        &self.layouts
    }

    fn effective_seed(request: &GenerationRequest) -> u64 {
        if request.flag("salt_with_process_id") {
            request.seed ^ u64::from(std::process::id())
        } else {
            request.seed
        }
    }

    fn build_player(
        &self,
        result: &mut GenerationResult,
        id: PlayerId,
        settings: &PlayerSettings,
        defaults: &Value,
        rng: &mut Pcg64,
    ) -> anyhow::Result<()> {
        let game = game_spec(&settings.game)
            .with_context(|| format!("unknown game '{}' for player {id}", settings.game))?;
        result.add_player(id, settings.name.clone(), game.name);

        for key in settings.options.keys() {
            if !game.options.iter().any(|o| o.key == key) {
                tracing::warn!(player = %id, option = %key, "ignoring undeclared option");
            }
        }

        let mut resolved: HashMap<&str, String> = HashMap::new();
        for spec in game.options {
            let value = settings.options.get(spec.key).or_else(|| defaults.get(spec.key));
            let (raw, canonical) = resolve_option(spec, value, rng)
                .with_context(|| format!("player {id} ({})", game.name))?;
            resolved.insert(spec.key, canonical.clone());
            if let Some(world) = result.player_mut(id) {
                world.set_option(spec.key, raw, canonical);
            }
        }
        let option = |key: &str| resolved.get(key).cloned().unwrap_or_default();

        let area_count: usize = match game.name {
            "Caverns" => option("depth").parse::<usize>()? + 1,
            _ => option("area_count").parse()?,
        };

        let menu = result.add_region(id, "Menu");
        let mut previous = (menu, "Menu".to_owned());
        let mut areas = Vec::with_capacity(area_count);
        let mut address = game.code_base + u64::from(id.0) * 1_000;

        for index in 0..area_count {
            let name = self.layouts.area_name(game, index);
            let region = result.add_region(id, name.clone());
            result.connect(id, format!("{} -> {name}", previous.1), Some(previous.0), Some(region));

            for chest in 1..=rng.gen_range(1..=3) {
                // The first chest of an area is never excluded, so there is
                // always room for progression.
                let progress_type = match rng.gen_range(0..20) {
                    0..=1 if chest > 1 => LocationProgressType::Excluded,
                    2..=4 => LocationProgressType::Priority,
                    _ => LocationProgressType::Default,
                };
                result.add_location(
                    region,
                    format!("{name} Chest {chest}"),
                    Some(address),
                    progress_type,
                );
                address += 1;
            }
            areas.push(region);
            previous = (region, name);
        }

        if let Some(&last) = areas.last() {
            match game.name {
                "Meadow" if option("shortcuts") == "true" => {
                    result.connect(id, "Menu -> Shortcut", Some(menu), Some(last));
                }
                "Caverns" => {
                    result.connect(id, "Collapsed Tunnel", Some(last), None);
                }
                _ => {}
            }
        }

        if option("isolated_region") == "true" {
            let vault = result.add_region(id, "Sealed Vault");
            result.add_location(
                vault,
                "Sealed Vault Reliquary",
                Some(address),
                LocationProgressType::Default,
            );
        }

        if option("lantern_start") == "true" {
            let code = game.code_base + u64::from(id.0) * 1_000 + 999;
            result.precollect(
                id,
                Item::new("Lantern", id, Some(code), ItemClassification::PROGRESSION),
            );
        }

        tracing::debug!(player = %id, game = game.name, areas = area_count, "player world built");
        Ok(())
    }

    /// One item per location owned by `player`: progression first, then
    /// useful, then filler.
    fn create_items(result: &GenerationResult, player: PlayerId, game: &GameSpec) -> Vec<Item> {
        let count = result.locations_of(player).count();
        let progression = (count / 4).max(1).min(count);
        let base = game.code_base + u64::from(player.0) * 1_000 + 500;

        (0..count)
            .map(|k| {
                let (name, classification) = if k < progression {
                    (
                        game.progression[k % game.progression.len()],
                        ItemClassification::PROGRESSION,
                    )
                } else if k == progression {
                    (game.useful[0], ItemClassification::USEFUL)
                } else {
                    (
                        game.filler[k % game.filler.len()],
                        ItemClassification::empty(),
                    )
                };
                Item::new(name, player, Some(base + k as u64), classification)
            })
            .collect()
    }

    /// Place the whole pool. Progression items never land in excluded
    /// locations.
    fn fill(result: &mut GenerationResult, rng: &mut Pcg64) -> anyhow::Result<()> {
        let mut pool = result.item_pool.clone();
        pool.shuffle(rng);
        pool.sort_by_key(|item| !item.classification.contains(ItemClassification::PROGRESSION));

        let players: Vec<PlayerId> = result.players().iter().map(|p| p.id).collect();
        let mut open: Vec<(LocationId, bool)> = players
            .iter()
            .flat_map(|&p| {
                result
                    .locations_of(p)
                    .map(|(id, loc)| (id, loc.progress_type == LocationProgressType::Excluded))
                    .collect::<Vec<_>>()
            })
            .collect();
        open.shuffle(rng);
        // Non-excluded slots first so progression takes them.
        open.sort_by_key(|&(_, excluded)| excluded);

        if pool.len() > open.len() {
            bail!("item pool ({}) is larger than the location count ({})", pool.len(), open.len());
        }
        for (item, &(location, excluded)) in pool.into_iter().zip(&open) {
            if excluded && item.classification.contains(ItemClassification::PROGRESSION) {
                bail!("no unexcluded location left for progression item '{}'", item.name);
            }
            result.place_item(location, item);
        }
        Ok(())
    }

    /// Every region of every player must be reachable from its `Menu`.
    fn check_connectivity(result: &GenerationResult) -> anyhow::Result<()> {
        for world in result.players() {
            let id = world.id;
            let regions: Vec<(RegionId, String)> = result
                .regions_of(id)
                .map(|(rid, r)| (rid, r.name.clone()))
                .collect();
            let Some(&(menu, _)) = regions.iter().find(|(_, name)| name == "Menu") else {
                bail!("player {id} has no Menu region");
            };

            let mut reached = BTreeSet::from([menu.0]);
            let mut queue = VecDeque::from([menu]);
            while let Some(region) = queue.pop_front() {
                for (_, entrance) in result.entrances_of(id) {
                    if entrance.parent_region != Some(region) {
                        continue;
                    }
                    if let Some(next) = entrance.connected_region {
                        if reached.insert(next.0) {
                            queue.push_back(next);
                        }
                    }
                }
            }

            if let Some((_, name)) = regions.iter().find(|(rid, _)| !reached.contains(&rid.0)) {
                bail!("no connected region for player {id}: {name}");
            }
        }
        Ok(())
    }
}

impl GenerationEngine for ReferenceEngine {
    fn name(&self) -> &str {
        LOCATOR
    }

    fn catalog(&self) -> &GeneratorCatalog {
        &self.catalog
    }

    fn install_legacy(&self, entry_points: &mut LegacyEntryPoints) {
        entry_points.install(INIT_LOGGING, |_| {
            tracing::info!("reference engine logging initialised");
            Ok(Value::Null)
        });
        entry_points.install("get_settings", |_| {
            Ok(json!({ "spoiler": false, "race": false }))
        });
        entry_points.install("get_options", |args| {
            let game = args.first().and_then(Value::as_str).unwrap_or_default();
            let Some(spec) = game_spec(game) else {
                bail!("unknown game '{game}'");
            };
            let defaults: serde_json::Map<String, Value> = spec
                .options
                .iter()
                .map(|o| {
                    let value = match o.kind {
                        OptionKind::Choice(choices) => json!(choices[0]),
                        OptionKind::Range { default, .. } => json!(default),
                        OptionKind::Toggle => json!(false),
                    };
                    (o.key.to_owned(), value)
                })
                .collect();
            Ok(Value::Object(defaults))
        });
    }

    fn register_caches(&self, caches: &mut CacheRegistry) {
        caches.register(self.layouts.clone());
    }

    fn generate(
        &mut self,
        request: &GenerationRequest,
        context: &EngineContext,
    ) -> anyhow::Result<GenerationResult> {
        context.legacy.call(INIT_LOGGING, &[])?;

        if let Some(message) = request.settings.get("panic_message").and_then(Value::as_str) {
            panic!("{message}");
        }
        if let Some(ms) = request.settings.get("stall_ms").and_then(Value::as_u64) {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if request.flag("use_legacy_settings") {
            let host = context
                .legacy
                .call("get_settings", &[json!(request.seed)])
                .context("reading host settings")?;
            tracing::debug!(settings = %host, "host settings");
        }
        if request.players.is_empty() {
            bail!("no players in request");
        }

        let seed = Self::effective_seed(request);
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut result = GenerationResult::new(seed);

        for (slot, settings) in request.players.iter().enumerate() {
            let id = PlayerId(u32::try_from(slot + 1).context("too many players")?);
            let defaults = if request.flag("use_legacy_options") {
                context
                    .legacy
                    .call("get_options", &[json!(settings.game)])
                    .context("reading player defaults")?
            } else {
                Value::Null
            };
            self.build_player(&mut result, id, settings, &defaults, &mut rng)?;
        }

        Self::check_connectivity(&result)?;

        let items: Vec<Item> = result
            .players()
            .iter()
            .filter_map(|world| game_spec(&world.game).map(|game| (world.id, game)))
            .flat_map(|(id, game)| Self::create_items(&result, id, game))
            .collect();
        result.item_pool.extend(items);
        Self::fill(&mut result, &mut rng)?;

        tracing::debug!(
            seed,
            players = result.players().len(),
            locations = result.location_count(),
            "generation finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinrun_snapshot::snapshot::capture_snapshot;
    use twinrun_worker::engine::EngineHost;
    use twinrun_worker::legacy::LegacyPolicy;

    fn host() -> EngineHost {
        EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::default())
    }

    fn two_players(seed: u64) -> GenerationRequest {
        GenerationRequest::new(seed)
            .with_player(
                PlayerSettings::new("Alice", "Meadow").with_option("shortcuts", json!(true)),
            )
            .with_player(
                PlayerSettings::new("Bob", "Caverns").with_option("lantern_start", json!(1)),
            )
    }

    fn hash_of(host: &mut EngineHost, request: &GenerationRequest) -> String {
        let result = host.generate(request).unwrap();
        capture_snapshot(&result, host.catalog()).unwrap().content_hash()
    }

    #[test]
    fn same_request_same_snapshot() {
        let mut host = host();
        let request = two_players(7);
        assert_eq!(hash_of(&mut host, &request), hash_of(&mut host, &request));
    }

    #[test]
    fn every_location_is_filled() {
        let mut host = host();
        let result = host.generate(&two_players(3)).unwrap();
        for world in result.players() {
            for (_, location) in result.locations_of(world.id) {
                let item = location.item.as_ref().expect("location left empty");
                if location.progress_type == LocationProgressType::Excluded {
                    assert!(!item.classification.contains(ItemClassification::PROGRESSION));
                }
            }
        }
        assert_eq!(result.item_pool.len(), result.location_count());
    }

    #[test]
    fn options_resolve_to_canonical_names() {
        let mut host = host();
        let request = GenerationRequest::new(1).with_player(
            PlayerSettings::new("Alice", "Meadow")
                .with_option("goal", json!("HARVEST"))
                .with_option("area_count", json!("5")),
        );
        let result = host.generate(&request).unwrap();
        let world = &result.players()[0];
        assert_eq!(world.options["goal"].canonical, "harvest");
        assert_eq!(world.options["goal"].raw, json!(1));
        assert_eq!(world.options["area_count"].canonical, "5");
        assert_eq!(world.options["shortcuts"].canonical, "false");
    }

    #[test]
    fn invalid_option_is_rejected() {
        let mut host = host();
        let request = GenerationRequest::new(1)
            .with_player(PlayerSettings::new("Alice", "Caverns").with_option("depth", json!(40)));
        let err = host.generate(&request).unwrap_err();
        assert!(format!("{err:#}").contains("invalid value 40 for option 'depth'"));
    }

    #[test]
    fn isolated_region_fails_connectivity() {
        let mut host = host();
        let request = GenerationRequest::new(1).with_player(
            PlayerSettings::new("Alice", "Meadow").with_option("isolated_region", json!(true)),
        );
        let err = host.generate(&request).unwrap_err();
        assert_eq!(err.to_string(), "no connected region for player 1: Sealed Vault");
    }

    #[test]
    fn caverns_has_a_dangling_entrance() {
        let mut host = host();
        let request =
            GenerationRequest::new(5).with_player(PlayerSettings::new("Bob", "Caverns"));
        let result = host.generate(&request).unwrap();
        let dangling: Vec<_> = result
            .entrances_of(PlayerId(1))
            .filter(|(_, e)| e.connected_region.is_none())
            .map(|(_, e)| e.name.clone())
            .collect();
        assert_eq!(dangling, vec!["Collapsed Tunnel"]);
    }

    #[test]
    fn disabled_legacy_settings_fail_generation() {
        let policy = LegacyPolicy {
            silence: Vec::new(),
            disable: vec!["get_settings".to_owned()],
        };
        let mut host = EngineHost::new(ReferenceEngine::boxed(), &policy);
        let request = two_players(1).with_setting("use_legacy_settings", json!(true));
        let err = host.generate(&request).unwrap_err();
        assert!(err.to_string().contains("reading host settings"));

        // Without the flag the disabled entry point is never touched.
        assert!(host.generate(&two_players(1)).is_ok());
    }

    #[test]
    fn layout_cache_is_evictable() {
        let mut host = host();
        host.generate(&two_players(9)).unwrap();
        let stats = host.evict_caches();
        assert_eq!(stats.caches, 1);
        assert!(stats.entries > 0);
        assert_eq!(host.evict_caches().entries, 0);
    }
}
