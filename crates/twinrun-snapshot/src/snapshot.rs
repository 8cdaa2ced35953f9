//! Canonical world snapshots.
//!
//! Provides [`WorldSnapshot`] -- the canonical, comparable representation of
//! one generation result -- and [`capture_snapshot`], the pure function that
//! produces it from a [`GenerationResult`] graph.
//!
//! # Ordering
//!
//! Player-keyed maps are `BTreeMap`s (ordered by id). Name-keyed maps are
//! `IndexMap`s that keep the engine's iteration order, because that order is
//! itself something the diff engine checks. Note that `IndexMap` equality is
//! order-insensitive; use [`WorldSnapshot::content_hash`] or the diff engine
//! when order matters.
//!
//! # What Is NOT Captured
//!
//! - **Raw option values** -- only the canonical option name is kept.
//! - **Arena ids** -- regions, entrances and locations are referenced by name.
//! - **Seed** -- two runs of the same request are expected to share it; a
//!   seed-dependent divergence shows up in the content anyway.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::GeneratorCatalog;
use crate::graph::{GenerationResult, Item, LocationProgressType, PlayerId};
use crate::SnapshotError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Value-comparable view of an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRecord {
    pub name: String,
    pub player: PlayerId,
    pub code: Option<u64>,
    /// Raw [`ItemClassification`](crate::graph::ItemClassification) bits.
    pub classification: u8,
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            player: item.player,
            code: item.code,
            classification: item.classification.bits(),
        }
    }
}

impl fmt::Display for ItemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (player {}, code ", self.name, self.player)?;
        match self.code {
            Some(code) => write!(f, "{code}")?,
            None => write!(f, "none")?,
        }
        write!(f, ", flags {:#06b})", self.classification)
    }
}

/// Snapshot of one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub address: Option<u64>,
    pub progress_type: LocationProgressType,
    /// The placed item, `None` when the location is empty.
    pub item: Option<ItemRecord>,
}

/// Snapshot of one entrance: the names of its endpoint regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntranceRecord {
    pub parent_region: Option<String>,
    pub connected_region: Option<String>,
}

impl fmt::Display for EntranceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self.parent_region.as_deref().unwrap_or("null");
        let connected = self.connected_region.as_deref().unwrap_or("null");
        write!(f, "({parent}, {connected})")
    }
}

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// Canonical representation of one generation result.
///
/// Produced once per attempt by [`capture_snapshot`], never mutated
/// afterwards, and consumed only by the diff engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// player -> option name -> canonical option value.
    pub options: BTreeMap<PlayerId, IndexMap<String, String>>,
    /// Shared item pool in engine allocation order.
    pub item_pool: Vec<ItemRecord>,
    /// player -> start items in grant order.
    pub start_inventory: BTreeMap<PlayerId, Vec<ItemRecord>>,
    /// player -> region name -> location names in region order.
    pub regions: BTreeMap<PlayerId, IndexMap<String, Vec<String>>>,
    /// player -> entrance name -> endpoint region names.
    pub entrances: BTreeMap<PlayerId, IndexMap<String, EntranceRecord>>,
    /// player -> location name -> location record, in engine order.
    pub locations: BTreeMap<PlayerId, IndexMap<String, LocationRecord>>,
}

impl WorldSnapshot {
    /// BLAKE3 hex digest of the snapshot's JSON serialization.
    ///
    /// Serialization preserves `IndexMap` order, so two snapshots that differ
    /// only in iteration order hash differently.
    pub fn content_hash(&self) -> String {
        let json_bytes =
            serde_json::to_vec(self).expect("WorldSnapshot should always be JSON-serializable");
        blake3::hash(&json_bytes).to_hex().to_string()
    }

    /// Total number of locations across all players.
    pub fn location_count(&self) -> usize {
        self.locations.values().map(IndexMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Serialize a result graph into a [`WorldSnapshot`].
///
/// Walks every player in allocation order and captures, in engine order:
///
/// 1. `Game`, `Name`, then every option the catalog declares for the
///    player's game (canonical string value only).
/// 2. The item pool and the player's start items.
/// 3. Regions with their location names.
/// 4. Entrances with resolved endpoint names (`None` for absent endpoints).
/// 5. Locations with address, progress type and placed item.
///
/// The input is only borrowed; the graph is never modified.
///
/// # Errors
///
/// - [`SnapshotError::UnknownGame`] if a player's game is not in `catalog`.
/// - [`SnapshotError::MissingOption`] if a declared option was not resolved.
/// - [`SnapshotError::DanglingRegion`] / [`SnapshotError::DanglingLocation`]
///   if an id does not belong to `result`.
pub fn capture_snapshot(
    result: &GenerationResult,
    catalog: &GeneratorCatalog,
) -> Result<WorldSnapshot, SnapshotError> {
    let mut snapshot = WorldSnapshot {
        item_pool: result.item_pool.iter().map(ItemRecord::from).collect(),
        start_inventory: result
            .precollected
            .iter()
            .map(|(player, items)| (*player, items.iter().map(ItemRecord::from).collect()))
            .collect(),
        ..WorldSnapshot::default()
    };

    for world in result.players() {
        let player = world.id;

        // 1. Options.
        let declared =
            catalog
                .declared_options(&world.game)
                .ok_or_else(|| SnapshotError::UnknownGame {
                    player,
                    game: world.game.clone(),
                    registered: catalog.games().collect::<Vec<_>>().join(", "),
                })?;
        let mut options = IndexMap::with_capacity(declared.len() + 2);
        options.insert("Game".to_owned(), world.game.clone());
        options.insert("Name".to_owned(), world.name.clone());
        for key in declared {
            let setting = world
                .options
                .get(key)
                .ok_or_else(|| SnapshotError::MissingOption {
                    player,
                    game: world.game.clone(),
                    option: key.clone(),
                })?;
            options.insert(key.clone(), setting.canonical.clone());
        }
        snapshot.options.insert(player, options);

        // 2. Regions.
        let mut regions = IndexMap::new();
        for (_, region) in result.regions_of(player) {
            let mut names = Vec::with_capacity(region.locations.len());
            for &loc_id in &region.locations {
                let location = result
                    .location(loc_id)
                    .ok_or(SnapshotError::DanglingLocation(loc_id))?;
                names.push(location.name.clone());
            }
            regions.insert(region.name.clone(), names);
        }
        snapshot.regions.insert(player, regions);

        // 3. Entrances.
        let mut entrances = IndexMap::new();
        for (_, entrance) in result.entrances_of(player) {
            let parent_region = region_name(result, entrance.parent_region)?;
            let connected_region = region_name(result, entrance.connected_region)?;
            entrances.insert(
                entrance.name.clone(),
                EntranceRecord {
                    parent_region,
                    connected_region,
                },
            );
        }
        snapshot.entrances.insert(player, entrances);

        // 4. Locations.
        let mut locations = IndexMap::new();
        for (_, location) in result.locations_of(player) {
            locations.insert(
                location.name.clone(),
                LocationRecord {
                    address: location.address,
                    progress_type: location.progress_type,
                    item: location.item.as_ref().map(ItemRecord::from),
                },
            );
        }
        snapshot.locations.insert(player, locations);
    }

    tracing::debug!(
        players = result.players().len(),
        items = snapshot.item_pool.len(),
        locations = snapshot.location_count(),
        "captured world snapshot"
    );

    Ok(snapshot)
}

fn region_name(
    result: &GenerationResult,
    id: Option<crate::graph::RegionId>,
) -> Result<Option<String>, SnapshotError> {
    match id {
        None => Ok(None),
        Some(id) => result
            .region(id)
            .map(|r| Some(r.name.clone()))
            .ok_or(SnapshotError::DanglingRegion(id)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
