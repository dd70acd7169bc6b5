//! Analysis configuration.
//!
//! Every limit that keeps the abstract interpreter finite lives here, along
//! with the source/sink/sanitizer name lists the checker matches against.
//! A `quarry.toml` file can override any field; missing fields keep their
//! defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum times a single call site is re-entered before the call is
    /// skipped.
    pub call_limit: u32,
    /// Maximum simulated call-stack depth.
    pub call_depth: u32,
    /// Prototype-chain hops before a lookup gives up.
    pub proto_depth: u32,
    /// Iterations a loop body is run when its condition cannot be resolved.
    pub loop_limit: u32,
    /// Run only the first feasible branch instead of forking on unresolved
    /// conditions.
    pub single_branch: bool,
    /// Reclaim objects private to a block scope when the block exits.
    pub scope_gc: bool,
    /// Wall-clock budget for one run. `None` disables the timeout.
    #[serde(with = "humantime_secs")]
    pub timeout: Option<Duration>,
    /// Vulnerability classes to check.
    pub classes: Vec<String>,
    /// Function names whose return value is a fresh tainted wildcard.
    pub sources: Vec<String>,
    /// Function names that launder taint (numeric coercions and friends).
    pub sanitizers: Vec<String>,
    /// Functions invoked with fake tainted arguments after the synchronous
    /// phase, in addition to every module export.
    pub entry_points: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_limit: 3,
            call_depth: 30,
            proto_depth: 5,
            loop_limit: 3,
            single_branch: false,
            scope_gc: false,
            timeout: Some(Duration::from_secs(30)),
            classes: crate::checker::catalogue::default_classes(),
            sources: vec!["user_input".into(), "read_input".into()],
            sanitizers: vec!["parseInt".into(), "parseFloat".into(), "Number".into()],
            entry_points: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    pub fn checks_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn is_source(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s == name)
    }

    pub fn is_sanitizer(&self, name: &str) -> bool {
        self.sanitizers.iter().any(|s| s == name)
    }
}

/// Timeout is written as whole seconds in TOML; `0` disables it.
mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(v.map(|d| d.as_secs()).unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_finite() {
        let config = Config::default();
        assert_eq!(config.call_limit, 3);
        assert_eq!(config.proto_depth, 5);
        assert!(config.timeout.is_some());
        assert!(config.checks_class("proto_pollution"));
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "call_limit = 5\ntimeout = 0\nsources = [\"taint\"]").unwrap();
        let config = Config::from_toml_path(file.path()).expect("config should parse");
        assert_eq!(config.call_limit, 5);
        assert!(config.timeout.is_none(), "timeout 0 disables the budget");
        assert!(config.is_source("taint"));
        assert!(!config.is_source("user_input"));
        // untouched fields keep defaults
        assert_eq!(config.proto_depth, 5);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "call_limit = \"many\"").unwrap();
        assert!(Config::from_toml_path(file.path()).is_err());
    }
}
