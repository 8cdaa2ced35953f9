//! twinrun diff -- structural comparison of two world snapshots.
//!
//! This crate compares two [`WorldSnapshot`]s and produces a [`DiffReport`]:
//! an ordered list of labeled sections, each holding the findings of one
//! comparator. An empty report means the two runs are considered equivalent.
//!
//! # Modules
//!
//! - [`compare`]: the five independently invokable comparators (options,
//!   item lists, regions, entrances, locations).
//! - [`report`]: [`Finding`], [`DiffSection`] and [`DiffReport`].
//!
//! # Example
//!
//! ```
//! use twinrun_diff::compare_snapshots;
//! use twinrun_snapshot::snapshot::WorldSnapshot;
//!
//! let snapshot = WorldSnapshot::default();
//! let report = compare_snapshots(&snapshot, &snapshot.clone());
//! assert!(report.is_empty());
//! ```

#![deny(unsafe_code)]

pub mod compare;
pub mod report;

pub use compare::compare_snapshots;
pub use report::{DiffReport, DiffSection, Finding, FindingKind};

/// Labels of the report sections, in report order.
pub mod labels {
    pub const OPTIONS: &str = "ROLLED OPTIONS";
    pub const ITEM_POOL: &str = "ITEMPOOL";
    pub const REGIONS: &str = "REGIONS";
    pub const ENTRANCES: &str = "ENTRANCES";
    pub const LOCATIONS: &str = "LOCATIONS";

    /// Label of one player's start-inventory section.
    pub fn start_inventory(player: twinrun_snapshot::graph::PlayerId) -> String {
        format!("START INVENTORY (player {player})")
    }
}
