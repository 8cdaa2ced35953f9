//! twinrun snapshot -- generation inputs, result graph, and canonical snapshots.
//!
//! This crate is the data model of the twinrun determinism oracle. A
//! generation engine consumes a [`GenerationRequest`](request::GenerationRequest)
//! and produces a [`GenerationResult`](graph::GenerationResult) graph. The
//! snapshot serializer ([`capture_snapshot`](snapshot::capture_snapshot))
//! walks that graph and produces a [`WorldSnapshot`](snapshot::WorldSnapshot):
//! a canonical, comparable value that can cross a process boundary and be
//! diffed against a snapshot produced by an independent run.
//!
//! # Quick Start
//!
//! ```
//! use twinrun_snapshot::prelude::*;
//!
//! let mut catalog = GeneratorCatalog::new();
//! catalog.register(WorldDescriptor::new("Meadow", ["size"]));
//!
//! let mut result = GenerationResult::new(7);
//! let player = result.add_player(PlayerId(1), "Alice", "Meadow");
//! result
//!     .player_mut(player)
//!     .unwrap()
//!     .set_option("size", serde_json::json!(3), "3");
//! let menu = result.add_region(player, "Menu");
//! result.add_location(menu, "Chest", Some(100), LocationProgressType::Default);
//!
//! let snapshot = capture_snapshot(&result, &catalog).unwrap();
//! assert_eq!(snapshot.regions[&player]["Menu"], vec!["Chest".to_owned()]);
//! assert_eq!(snapshot.options[&player]["size"], "3");
//! ```

#![deny(unsafe_code)]

pub mod catalog;
pub mod graph;
pub mod request;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while serializing a result graph into a snapshot.
///
/// Every variant indicates a logic bug in the engine or the oracle rather
/// than a property of the system under test, so callers treat them as fatal
/// to the current attempt.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A player's game is not declared in the generator catalog.
    #[error(
        "game '{game}' of player {player} is not registered in the generator catalog. \
         Registered games: [{registered}]"
    )]
    UnknownGame {
        player: graph::PlayerId,
        game: String,
        registered: String,
    },

    /// The catalog declares an option the player's world did not resolve.
    #[error("player {player} ({game}) has no value for declared option '{option}'")]
    MissingOption {
        player: graph::PlayerId,
        game: String,
        option: String,
    },

    /// A region id does not belong to the result graph.
    #[error("region id {0:?} does not exist in the result graph")]
    DanglingRegion(graph::RegionId),

    /// A location id does not belong to the result graph.
    #[error("location id {0:?} does not exist in the result graph")]
    DanglingLocation(graph::LocationId),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::catalog::{GeneratorCatalog, WorldDescriptor};
    pub use crate::graph::{
        Entrance, EntranceId, GenerationResult, Item, ItemClassification, Location, LocationId,
        LocationProgressType, OptionSetting, PlayerId, PlayerWorld, Region, RegionId,
    };
    pub use crate::request::{GenerationRequest, PlayerSettings};
    pub use crate::snapshot::{
        capture_snapshot, EntranceRecord, ItemRecord, LocationRecord, WorldSnapshot,
    };
    pub use crate::SnapshotError;
}
