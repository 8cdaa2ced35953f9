//! Generation result graph.
//!
//! A [`GenerationResult`] is what a generation engine hands back after a
//! successful run: per-player world metadata, the shared item pool, the
//! precollected (start) items, and an arena of regions, entrances and
//! locations linked by typed ids.
//!
//! The arena preserves insertion order. Per-player iteration
//! ([`regions_of`](GenerationResult::regions_of) and friends) yields entities
//! in the order the engine created them, which is exactly the order the
//! snapshot serializer must preserve.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable player identifier (1-based, assigned by the engine).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a [`Region`] in a [`GenerationResult`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub usize);

/// Index of an [`Entrance`] in a [`GenerationResult`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntranceId(pub usize);

/// Index of a [`Location`] in a [`GenerationResult`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationId(pub usize);

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Classification bits of an item.
    ///
    /// An item with no bits set is filler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ItemClassification: u8 {
        /// Required to reach the goal.
        const PROGRESSION = 0b0001;
        /// Helpful but not required.
        const USEFUL = 0b0010;
        /// Actively harmful to the receiving player.
        const TRAP = 0b0100;
        /// Excluded from progression balancing.
        const SKIP_BALANCING = 0b1000;
    }
}

/// An item produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Display name.
    pub name: String,
    /// The player that owns (receives) this item.
    pub player: PlayerId,
    /// Numeric item code, `None` for event items.
    pub code: Option<u64>,
    /// Classification bits.
    pub classification: ItemClassification,
}

impl Item {
    /// Create an item.
    pub fn new(
        name: impl Into<String>,
        player: PlayerId,
        code: Option<u64>,
        classification: ItemClassification,
    ) -> Self {
        Self {
            name: name.into(),
            player,
            code,
            classification,
        }
    }
}

// ---------------------------------------------------------------------------
// Locations, regions, entrances
// ---------------------------------------------------------------------------

/// How the fill algorithm treats a location.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LocationProgressType {
    /// No constraint.
    #[default]
    Default,
    /// Should receive progression items.
    Priority,
    /// Must not receive progression items.
    Excluded,
}

impl fmt::Display for LocationProgressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationProgressType::Default => write!(f, "default"),
            LocationProgressType::Priority => write!(f, "priority"),
            LocationProgressType::Excluded => write!(f, "excluded"),
        }
    }
}

/// A location that can hold one item.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub player: PlayerId,
    /// The region this location belongs to.
    pub region: RegionId,
    /// Numeric address, `None` for event locations.
    pub address: Option<u64>,
    pub progress_type: LocationProgressType,
    /// The item placed here by the fill, if any.
    pub item: Option<Item>,
}

/// A region: a named container of locations.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub player: PlayerId,
    /// Locations in this region, in creation order.
    pub locations: Vec<LocationId>,
}

/// A one-way connection between two regions. Either endpoint may be absent
/// (a dangling entrance created by an entrance randomizer, for example).
#[derive(Debug, Clone)]
pub struct Entrance {
    pub name: String,
    pub player: PlayerId,
    pub parent_region: Option<RegionId>,
    pub connected_region: Option<RegionId>,
}

// ---------------------------------------------------------------------------
// Player worlds
// ---------------------------------------------------------------------------

/// A resolved option value.
///
/// `raw` is whatever the engine stores internally; `canonical` is the
/// option's canonical string name. Only `canonical` ends up in a snapshot so
/// that raw representation differences between processes (e.g. `1` vs
/// `true`) never register as nondeterminism.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSetting {
    pub raw: serde_json::Value,
    pub canonical: String,
}

/// Per-player world metadata.
#[derive(Debug, Clone)]
pub struct PlayerWorld {
    pub id: PlayerId,
    pub name: String,
    /// Stable game name, used to query the generator catalog.
    pub game: String,
    /// Resolved options by key.
    pub options: BTreeMap<String, OptionSetting>,
}

impl PlayerWorld {
    /// Record a resolved option.
    pub fn set_option(
        &mut self,
        key: impl Into<String>,
        raw: serde_json::Value,
        canonical: impl Into<String>,
    ) {
        self.options.insert(
            key.into(),
            OptionSetting {
                raw,
                canonical: canonical.into(),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// GenerationResult
// ---------------------------------------------------------------------------

/// The output graph of one successful generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    /// Seed the engine actually used.
    pub seed: u64,
    /// Player worlds in player-id allocation order.
    players: Vec<PlayerWorld>,
    /// Shared item pool in engine allocation order.
    pub item_pool: Vec<Item>,
    /// Precollected (start) items per player, in grant order.
    pub precollected: BTreeMap<PlayerId, Vec<Item>>,
    regions: Vec<Region>,
    entrances: Vec<Entrance>,
    locations: Vec<Location>,
}

impl GenerationResult {
    /// Create an empty result for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Add a player world and return its id.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        name: impl Into<String>,
        game: impl Into<String>,
    ) -> PlayerId {
        self.players.push(PlayerWorld {
            id,
            name: name.into(),
            game: game.into(),
            options: BTreeMap::new(),
        });
        id
    }

    /// All player worlds in allocation order.
    pub fn players(&self) -> &[PlayerWorld] {
        &self.players
    }

    /// Look up a player world.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerWorld> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Look up a player world mutably.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerWorld> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Create a region owned by `player`.
    pub fn add_region(&mut self, player: PlayerId, name: impl Into<String>) -> RegionId {
        let id = RegionId(self.regions.len());
        self.regions.push(Region {
            name: name.into(),
            player,
            locations: Vec::new(),
        });
        id
    }

    /// Create a location inside `region`. The location inherits the region's
    /// player.
    ///
    /// # Panics
    ///
    /// Panics if `region` was not created by this result.
    pub fn add_location(
        &mut self,
        region: RegionId,
        name: impl Into<String>,
        address: Option<u64>,
        progress_type: LocationProgressType,
    ) -> LocationId {
        let id = LocationId(self.locations.len());
        let owner = &mut self.regions[region.0];
        owner.locations.push(id);
        self.locations.push(Location {
            name: name.into(),
            player: owner.player,
            region,
            address,
            progress_type,
            item: None,
        });
        id
    }

    /// Create an entrance between two (optional) regions.
    pub fn connect(
        &mut self,
        player: PlayerId,
        name: impl Into<String>,
        parent_region: Option<RegionId>,
        connected_region: Option<RegionId>,
    ) -> EntranceId {
        let id = EntranceId(self.entrances.len());
        self.entrances.push(Entrance {
            name: name.into(),
            player,
            parent_region,
            connected_region,
        });
        id
    }

    /// Place an item at a location, returning the previously placed item.
    pub fn place_item(&mut self, location: LocationId, item: Item) -> Option<Item> {
        self.locations
            .get_mut(location.0)
            .and_then(|loc| loc.item.replace(item))
    }

    /// Grant a start item to `player`.
    pub fn precollect(&mut self, player: PlayerId, item: Item) {
        self.precollected.entry(player).or_default().push(item);
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn entrance(&self, id: EntranceId) -> Option<&Entrance> {
        self.entrances.get(id.0)
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id.0)
    }

    /// Regions owned by `player`, in creation order.
    pub fn regions_of(&self, player: PlayerId) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.player == player)
            .map(|(i, r)| (RegionId(i), r))
    }

    /// Entrances owned by `player`, in creation order.
    pub fn entrances_of(
        &self,
        player: PlayerId,
    ) -> impl Iterator<Item = (EntranceId, &Entrance)> {
        self.entrances
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.player == player)
            .map(|(i, e)| (EntranceId(i), e))
    }

    /// Locations owned by `player`, in creation order.
    pub fn locations_of(
        &self,
        player: PlayerId,
    ) -> impl Iterator<Item = (LocationId, &Location)> {
        self.locations
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.player == player)
            .map(|(i, l)| (LocationId(i), l))
    }

    /// Total number of locations across all players.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}
