//! Oracle configuration.
//!
//! ```json
//! {
//!   "worker": { "args": ["worker", "reference"], "request_timeout_ms": 30000 },
//!   "legacy": { "disable": ["get_settings"] },
//!   "hash_fast_path": true
//! }
//! ```
//!
//! Every field is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use twinrun_worker::config::WorkerConfig;
use twinrun_worker::legacy::LegacyPolicy;

use crate::OracleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// How to start the worker.
    pub worker: WorkerConfig,
    /// Legacy entry point policy for the in-process engine. The worker
    /// always applies its own policy.
    pub legacy: LegacyPolicy,
    /// Skip the diff when both snapshots hash equal. Default: true.
    pub hash_fast_path: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            legacy: LegacyPolicy::default(),
            hash_fast_path: true,
        }
    }
}

impl OracleConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Config`] if the file cannot be read or is not a
    /// valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let path = path.as_ref();
        let config_error = |message: String| OracleError::Config {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))
    }
}
