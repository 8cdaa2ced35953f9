//! Generation inputs.
//!
//! A [`GenerationRequest`] is the complete, serializable bundle of inputs for
//! one generation run. The oracle clones it before the in-process run starts
//! and forwards that clone to the worker, so whatever the in-process engine
//! does to its own copy never leaks into the delegated run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Settings for one player slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Player display name.
    pub name: String,
    /// Stable game name.
    pub game: String,
    /// Raw option values, interpreted by the engine.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl PlayerSettings {
    pub fn new(name: impl Into<String>, game: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            game: game.into(),
            options: BTreeMap::new(),
        }
    }

    /// Builder-style option setter.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Inputs for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Generation seed.
    pub seed: u64,
    /// Player slots in id order (slot `i` becomes player `i + 1`).
    pub players: Vec<PlayerSettings>,
    /// Engine-wide settings.
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            players: Vec::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_player(mut self, player: PlayerSettings) -> Self {
        self.players.push(player);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Boolean engine setting, `false` when absent or not a boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.settings
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_survives_json_round_trip() {
        let request = GenerationRequest::new(42)
            .with_player(PlayerSettings::new("Alice", "Meadow").with_option("size", json!(4)))
            .with_setting("use_legacy_settings", json!(true));

        let text = serde_json::to_string(&request).unwrap();
        let back: GenerationRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn missing_settings_default_to_empty() {
        let back: GenerationRequest =
            serde_json::from_str(r#"{"seed": 1, "players": [{"name": "A", "game": "Meadow"}]}"#)
                .unwrap();
        assert!(back.settings.is_empty());
        assert!(back.players[0].options.is_empty());
        assert!(!back.flag("anything"));
    }
}
