//! Worker launch configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to start a worker and how long to wait for it.
///
/// The worker is normally the `worker` subcommand of the executable that
/// hosts the oracle: an empty `program` means the current executable, and
/// `args` is `["worker", "<engine>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable to spawn. Empty means the current executable.
    pub program: PathBuf,
    /// Arguments, ending with the engine locator.
    pub args: Vec<String>,
    /// Maximum wait for the ready sentinel. `None` waits forever.
    /// Default: 60 000 ms.
    pub handshake_timeout_ms: Option<u64>,
    /// Maximum wait for one reply. `None` waits forever. Default: `None`.
    pub request_timeout_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: vec!["worker".to_owned(), "reference".to_owned()],
            handshake_timeout_ms: Some(60_000),
            request_timeout_ms: None,
        }
    }
}

impl WorkerConfig {
    /// Worker running `program worker <locator>`.
    pub fn for_program(program: impl Into<PathBuf>, locator: &str) -> Self {
        Self {
            program: program.into(),
            args: vec!["worker".to_owned(), locator.to_owned()],
            ..Self::default()
        }
    }

    /// Worker running the current executable's `worker` subcommand.
    pub fn for_current_exe(locator: &str) -> Self {
        Self::for_program(PathBuf::new(), locator)
    }

    /// Point the worker at `locator`: the last argument is replaced, or
    /// appended when there are no arguments.
    pub fn set_locator(&mut self, locator: &str) {
        match self.args.last_mut() {
            Some(last) => *last = locator.to_owned(),
            None => self.args.push(locator.to_owned()),
        }
    }

    /// The locator the worker will be started with.
    pub fn locator(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// The executable to spawn, with an empty `program` resolved to the
    /// current executable.
    pub fn resolved_program(&self) -> std::io::Result<PathBuf> {
        if self.program.as_os_str().is_empty() {
            std::env::current_exe()
        } else {
            Ok(self.program.clone())
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{"request_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.handshake_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.args, vec!["worker", "reference"]);
    }

    #[test]
    fn empty_program_resolves_to_current_exe() {
        let config = WorkerConfig::for_current_exe("reference");
        assert_eq!(
            config.resolved_program().unwrap(),
            std::env::current_exe().unwrap()
        );
        let explicit = WorkerConfig::for_program("/bin/twinrun", "reference");
        assert_eq!(explicit.resolved_program().unwrap(), PathBuf::from("/bin/twinrun"));
    }

    #[test]
    fn set_locator_replaces_the_trailing_argument() {
        let mut config: WorkerConfig =
            serde_json::from_str(r#"{"args": ["--quiet", "worker", "reference"]}"#).unwrap();
        config.set_locator("caverns-only");
        assert_eq!(config.args, vec!["--quiet", "worker", "caverns-only"]);
        assert_eq!(config.locator(), Some("caverns-only"));

        let mut bare = WorkerConfig {
            args: Vec::new(),
            ..WorkerConfig::default()
        };
        bare.set_locator("reference");
        assert_eq!(bare.args, vec!["reference"]);
    }
}
