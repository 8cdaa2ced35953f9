//! Generator catalog.
//!
//! The catalog is the only view the snapshot serializer has of the
//! generators ("worlds") an engine can run. It is keyed by the stable game
//! name and answers a single question: which option keys does this game
//! declare, and in what order. How the engine discovered or loaded the
//! generator is none of the serializer's business.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declaration of one generator type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDescriptor {
    /// Stable game name (e.g. `"Meadow"`).
    pub game: String,
    /// Declared option keys, in declaration order.
    pub option_keys: Vec<String>,
}

impl WorldDescriptor {
    pub fn new<I, S>(game: impl Into<String>, option_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            game: game.into(),
            option_keys: option_keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// Registry of generator descriptors keyed by game name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorCatalog {
    worlds: BTreeMap<String, WorldDescriptor>,
}

impl GeneratorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a descriptor.
    pub fn register(&mut self, descriptor: WorldDescriptor) {
        tracing::trace!(
            game = %descriptor.game,
            options = descriptor.option_keys.len(),
            "registering generator"
        );
        self.worlds.insert(descriptor.game.clone(), descriptor);
    }

    /// Look up a descriptor by game name.
    pub fn get(&self, game: &str) -> Option<&WorldDescriptor> {
        self.worlds.get(game)
    }

    /// Declared option keys for `game`, or `None` if the game is unknown.
    pub fn declared_options(&self, game: &str) -> Option<&[String]> {
        self.worlds.get(game).map(|d| d.option_keys.as_slice())
    }

    /// Registered game names, sorted.
    pub fn games(&self) -> impl Iterator<Item = &str> {
        self.worlds.keys().map(String::as_str)
    }

    pub fn contains(&self, game: &str) -> bool {
        self.worlds.contains_key(game)
    }
}
