//! Snapshot comparators.
//!
//! Five comparators, each usable on its own and each returning findings in a
//! deterministic order:
//!
//! | comparator            | policy                                                     |
//! |-----------------------|------------------------------------------------------------|
//! | [`compare_options`]   | missing player, then per-key value equality                |
//! | [`compare_items`]     | multiset first, order only when the multisets match        |
//! | [`compare_regions`]   | region-name set first, then location set, then order       |
//! | [`compare_entrances`] | entrance-name set first, then endpoint pair equality       |
//! | [`compare_locations`] | location-name set first, then scalars, placements, order   |
//!
//! Every per-player comparator visits the union of both runs' players in
//! ascending id. A player present in only one run yields exactly one
//! "missing" finding and is not compared further.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use twinrun_snapshot::graph::PlayerId;
use twinrun_snapshot::snapshot::{EntranceRecord, ItemRecord, LocationRecord, WorldSnapshot};

use crate::labels;
use crate::report::{DiffReport, Finding};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Visit the union of players in ascending id. Players present in both runs
/// are returned as pairs; players missing from one run produce a finding.
fn paired_players<'a, V>(
    m1: &'a BTreeMap<PlayerId, V>,
    m2: &'a BTreeMap<PlayerId, V>,
    scope: &str,
    findings: &mut Vec<Finding>,
) -> Vec<(PlayerId, &'a V, &'a V)> {
    let players: BTreeSet<PlayerId> = m1.keys().chain(m2.keys()).copied().collect();
    let mut pairs = Vec::with_capacity(players.len());
    for player in players {
        match (m1.get(&player), m2.get(&player)) {
            (Some(v1), Some(v2)) => pairs.push((player, v1, v2)),
            (Some(_), None) => findings.push(Finding::missing(format!(
                "Player {player} missing in second run{scope}"
            ))),
            (None, Some(_)) => findings.push(Finding::missing(format!(
                "Player {player} missing in first run{scope}"
            ))),
            (None, None) => {}
        }
    }
    pairs
}

/// Sorted symmetric difference of two maps' key sets.
fn key_symmetric_difference<V>(a: &IndexMap<String, V>, b: &IndexMap<String, V>) -> Vec<String> {
    let keys_a: BTreeSet<&String> = a.keys().collect();
    let keys_b: BTreeSet<&String> = b.keys().collect();
    keys_a
        .symmetric_difference(&keys_b)
        .map(|k| (*k).clone())
        .collect()
}

/// First index at which two sequences differ, with the elements at that
/// index. `None` when one is a prefix of the other.
fn first_difference<'a, T: PartialEq>(a: &'a [T], b: &'a [T]) -> Option<(usize, &'a T, &'a T)> {
    a.iter()
        .zip(b.iter())
        .enumerate()
        .find(|(_, (x, y))| x != y)
        .map(|(idx, (x, y))| (idx, x, y))
}

struct Maybe<'a, T>(Option<&'a T>);

impl<T: fmt::Display> fmt::Display for Maybe<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("none"),
        }
    }
}

fn count_items(items: &[ItemRecord]) -> BTreeMap<&ItemRecord, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

/// Multiset difference `a - b`, rendered as `[item, item x2]`.
fn render_excess(a: &BTreeMap<&ItemRecord, usize>, b: &BTreeMap<&ItemRecord, usize>) -> String {
    let entries: Vec<String> = a
        .iter()
        .filter_map(|(item, &count)| {
            let excess = count.saturating_sub(b.get(item).copied().unwrap_or(0));
            match excess {
                0 => None,
                1 => Some(item.to_string()),
                n => Some(format!("{item} x{n}")),
            }
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Compare rolled options. Keys are visited in lexicographic order over the
/// union of both runs' keys; an absent key renders as `none`.
pub fn compare_options(
    o1: &BTreeMap<PlayerId, IndexMap<String, String>>,
    o2: &BTreeMap<PlayerId, IndexMap<String, String>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (player, opts1, opts2) in paired_players(o1, o2, "", &mut findings) {
        let keys: BTreeSet<&String> = opts1.keys().chain(opts2.keys()).collect();
        for key in keys {
            let v1 = opts1.get(key);
            let v2 = opts2.get(key);
            if v1 != v2 {
                findings.push(Finding::content(format!(
                    "Option {key} for player {player}: {} vs {}",
                    Maybe(v1),
                    Maybe(v2)
                )));
            }
        }
    }
    findings
}

// ---------------------------------------------------------------------------
// Item lists
// ---------------------------------------------------------------------------

/// Compare two item sequences (item pool or one player's start inventory).
///
/// Emits at most one finding: a multiset difference if the contents differ,
/// otherwise an ordering difference if the sequences differ positionally.
pub fn compare_items(name: &str, i1: &[ItemRecord], i2: &[ItemRecord]) -> Vec<Finding> {
    let c1 = count_items(i1);
    let c2 = count_items(i2);
    if c1 != c2 {
        return vec![Finding::missing(format!(
            "{name}: different items (not just order)\n  only in run1: {}\n  only in run2: {}",
            render_excess(&c1, &c2),
            render_excess(&c2, &c1)
        ))];
    }

    match first_difference(i1, i2) {
        Some((idx, a, b)) => vec![Finding::ordering(format!(
            "{name}: same items, different order (first diff at {name}[{idx}]: {} vs {})",
            a.name, b.name
        ))],
        None => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Compare the region graph: region-name sets, then each region's location
/// set, then each region's location order.
pub fn compare_regions(
    r1: &BTreeMap<PlayerId, IndexMap<String, Vec<String>>>,
    r2: &BTreeMap<PlayerId, IndexMap<String, Vec<String>>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (player, regions1, regions2) in paired_players(r1, r2, " regions", &mut findings) {
        let difference = key_symmetric_difference(regions1, regions2);
        if !difference.is_empty() {
            findings.push(Finding::missing(format!(
                "Player {player} has different regions: {difference:?}"
            )));
            continue;
        }

        for (region, locs1) in regions1 {
            let Some(locs2) = regions2.get(region) else {
                continue;
            };
            let set1: BTreeSet<&String> = locs1.iter().collect();
            let set2: BTreeSet<&String> = locs2.iter().collect();
            if set1 != set2 {
                findings.push(Finding::missing(format!(
                    "Region '{region}' player {player}: different locations\n  \
                     run1: {locs1:?}\n  run2: {locs2:?}"
                )));
            } else if locs1 != locs2 {
                findings.push(Finding::ordering(format!(
                    "Region '{region}' player {player}: same locations, different order\n  \
                     run1: {locs1:?}\n  run2: {locs2:?}"
                )));
            }
        }
    }
    findings
}

// ---------------------------------------------------------------------------
// Entrances
// ---------------------------------------------------------------------------

/// Compare the entrance graph: entrance-name sets, then endpoint pairs.
pub fn compare_entrances(
    e1: &BTreeMap<PlayerId, IndexMap<String, EntranceRecord>>,
    e2: &BTreeMap<PlayerId, IndexMap<String, EntranceRecord>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (player, ents1, ents2) in paired_players(e1, e2, " entrances", &mut findings) {
        let difference = key_symmetric_difference(ents1, ents2);
        if !difference.is_empty() {
            findings.push(Finding::missing(format!(
                "Player {player} has different entrances: {difference:?}"
            )));
            continue;
        }

        for (entrance, ent1) in ents1 {
            let Some(ent2) = ents2.get(entrance) else {
                continue;
            };
            if ent1 != ent2 {
                findings.push(Finding::content(format!(
                    "Entrance '{entrance}' player {player}:\n  run1: {ent1}\n  run2: {ent2}"
                )));
            }
        }
    }
    findings
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Compare the location table.
///
/// Per player, in this order:
///
/// 1. Location-name set mismatch (short-circuits the player).
/// 2. Address and progress type, in run 1's order, one finding each.
/// 3. Placed items, in lexicographic location order.
/// 4. Iteration order: one finding citing the first differing index.
pub fn compare_locations(
    l1: &BTreeMap<PlayerId, IndexMap<String, LocationRecord>>,
    l2: &BTreeMap<PlayerId, IndexMap<String, LocationRecord>>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (player, locs1, locs2) in paired_players(l1, l2, " locations", &mut findings) {
        let difference = key_symmetric_difference(locs1, locs2);
        if !difference.is_empty() {
            findings.push(Finding::missing(format!(
                "Player {player} has different locations: {difference:?}"
            )));
            continue;
        }

        for (name, loc1) in locs1 {
            let Some(loc2) = locs2.get(name) else {
                continue;
            };
            if loc1.address != loc2.address {
                findings.push(Finding::content(format!(
                    "Location '{name}' player {player} address: {} vs {}",
                    Maybe(loc1.address.as_ref()),
                    Maybe(loc2.address.as_ref())
                )));
            }
            if loc1.progress_type != loc2.progress_type {
                findings.push(Finding::content(format!(
                    "Location '{name}' player {player} progress_type: {} vs {}",
                    loc1.progress_type, loc2.progress_type
                )));
            }
        }

        let sorted: BTreeSet<&String> = locs1.keys().collect();
        for name in sorted {
            let (Some(loc1), Some(loc2)) = (locs1.get(name), locs2.get(name)) else {
                continue;
            };
            if loc1.item != loc2.item {
                findings.push(Finding::content(format!(
                    "Placement at '{name}' player {player}:\n  run1: {}\n  run2: {}",
                    Maybe(loc1.item.as_ref()),
                    Maybe(loc2.item.as_ref())
                )));
            }
        }

        let order1: Vec<&String> = locs1.keys().collect();
        let order2: Vec<&String> = locs2.keys().collect();
        if let Some((idx, a, b)) = first_difference(&order1, &order2) {
            findings.push(Finding::ordering(format!(
                "Player {player}: locations in different order (first diff at {idx}: {a} vs {b})"
            )));
        }
    }
    findings
}

// ---------------------------------------------------------------------------
// Whole snapshots
// ---------------------------------------------------------------------------

/// Run every comparator and assemble the report.
///
/// Sections appear in a fixed order (options, item pool, one start inventory
/// per player, regions, entrances, locations); sections without findings are
/// omitted.
pub fn compare_snapshots(s1: &WorldSnapshot, s2: &WorldSnapshot) -> DiffReport {
    let mut report = DiffReport::new();

    report.push_section(labels::OPTIONS, compare_options(&s1.options, &s2.options));
    report.push_section(
        labels::ITEM_POOL,
        compare_items("Itempool", &s1.item_pool, &s2.item_pool),
    );

    let inventory_players: BTreeSet<PlayerId> = s1
        .start_inventory
        .keys()
        .chain(s2.start_inventory.keys())
        .copied()
        .collect();
    for player in inventory_players {
        let inv1 = s1.start_inventory.get(&player).map_or(&[][..], Vec::as_slice);
        let inv2 = s2.start_inventory.get(&player).map_or(&[][..], Vec::as_slice);
        report.push_section(
            labels::start_inventory(player),
            compare_items(&format!("Start inventory player {player}"), inv1, inv2),
        );
    }

    report.push_section(labels::REGIONS, compare_regions(&s1.regions, &s2.regions));
    report.push_section(
        labels::ENTRANCES,
        compare_entrances(&s1.entrances, &s2.entrances),
    );
    report.push_section(
        labels::LOCATIONS,
        compare_locations(&s1.locations, &s2.locations),
    );

    tracing::debug!(
        sections = report.sections().len(),
        findings = report.finding_count(),
        "compared snapshots"
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
