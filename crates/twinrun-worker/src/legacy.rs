//! Legacy entry points.
//!
//! Engines historically exposed a handful of process-wide helper functions
//! (`get_settings`, `get_options`, `init_logging`, ...). Instead of patching
//! globals, the host hands the engine an explicit [`LegacyEntryPoints`]
//! table. The engine installs its implementations, the host applies a
//! [`LegacyPolicy`], and every call goes through [`LegacyEntryPoints::call`],
//! which fails fast on a disabled entry.
//!
//! | state      | `call` result                              |
//! |------------|--------------------------------------------|
//! | `Enabled`  | whatever the installed function returns    |
//! | `Silenced` | `Ok(Value::Null)`, the function never runs |
//! | `Disabled` | `Err(LegacyCallError::Disabled)`           |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LegacyCallError;

/// Name of the logging entry point the worker always silences.
pub const INIT_LOGGING: &str = "init_logging";

/// A legacy entry point implementation.
pub type LegacyFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// State of one entry in the table.
#[derive(Clone)]
pub enum EntryPoint {
    Enabled(LegacyFn),
    Silenced,
    Disabled,
}

impl EntryPoint {
    pub fn state_name(&self) -> &'static str {
        match self {
            EntryPoint::Enabled(_) => "enabled",
            EntryPoint::Silenced => "silenced",
            EntryPoint::Disabled => "disabled",
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Which entry points to silence and which to disable.
///
/// Names not present in the table are still recorded, so a later install
/// cannot resurrect a disabled entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyPolicy {
    pub silence: Vec<String>,
    pub disable: Vec<String>,
}

impl LegacyPolicy {
    /// Policy applied inside a worker: logging setup is silenced so the
    /// engine cannot point its output at the protocol stream.
    pub fn worker() -> Self {
        Self {
            silence: vec![INIT_LOGGING.to_owned()],
            disable: Vec::new(),
        }
    }

    /// Merge `other` into `self`.
    pub fn merged(mut self, other: &LegacyPolicy) -> Self {
        for name in &other.silence {
            if !self.silence.contains(name) {
                self.silence.push(name.clone());
            }
        }
        for name in &other.disable {
            if !self.disable.contains(name) {
                self.disable.push(name.clone());
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Injectable table of legacy entry points.
#[derive(Debug, Clone, Default)]
pub struct LegacyEntryPoints {
    entries: BTreeMap<String, EntryPoint>,
}

impl LegacyEntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an implementation. An entry the policy already silenced or
    /// disabled keeps that state.
    pub fn install<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        match self.entries.get(&name) {
            Some(EntryPoint::Silenced | EntryPoint::Disabled) => {
                tracing::debug!(entry_point = %name, "keeping neutralized legacy entry point");
            }
            _ => {
                self.entries.insert(name, EntryPoint::Enabled(Arc::new(f)));
            }
        }
    }

    pub fn silence(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), EntryPoint::Silenced);
    }

    pub fn disable(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), EntryPoint::Disabled);
    }

    /// Apply a policy. Disabling wins over silencing.
    pub fn apply(&mut self, policy: &LegacyPolicy) {
        for name in &policy.silence {
            self.silence(name.clone());
        }
        for name in &policy.disable {
            self.disable(name.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntryPoint> {
        self.entries.get(name)
    }

    /// Entry names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Invoke an entry point.
    ///
    /// # Errors
    ///
    /// - [`LegacyCallError::Disabled`] if the entry is disabled.
    /// - [`LegacyCallError::Unknown`] if nothing was installed under `name`.
    /// - [`LegacyCallError::Failed`] if the implementation returned an error.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, LegacyCallError> {
        match self.entries.get(name) {
            Some(EntryPoint::Enabled(f)) => f(args).map_err(|source| LegacyCallError::Failed {
                name: name.to_owned(),
                source,
            }),
            Some(EntryPoint::Silenced) => Ok(Value::Null),
            Some(EntryPoint::Disabled) => {
                tracing::warn!(entry_point = name, "call to disabled legacy entry point");
                Err(LegacyCallError::Disabled {
                    name: name.to_owned(),
                })
            }
            None => Err(LegacyCallError::Unknown {
                name: name.to_owned(),
            }),
        }
    }
}
