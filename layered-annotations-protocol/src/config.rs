//! Session configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Knobs for how a session reads frames and reports problems.
///
/// Every field has a default, so a config file only names what it changes:
///
/// ```toml
/// output_set_parameter = "targetAS"
/// unescape_entities = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Parameter naming the set a stage reads from.
    pub input_set_parameter: String,
    /// Parameter naming the set a stage writes to.
    pub output_set_parameter: String,
    /// Decode character references in document text before processing.
    ///
    /// Offsets are translated in both directions so the host never sees
    /// the decoded coordinates.
    pub unescape_entities: bool,
    /// Prefix for every line written to the diagnostics channel.
    pub diagnostics_prefix: String,
}

impl SessionConfig {
    pub fn from_toml_str(content: &str) -> ProtocolResult<Self> {
        toml::from_str(content).map_err(|e| ProtocolError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ProtocolResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ProtocolError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ProtocolError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_set_parameter: "inputAS".to_string(),
            output_set_parameter: "outputAS".to_string(),
            unescape_entities: false,
            diagnostics_prefix: "annotation-stage".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_set_parameter = \"targetAS\"").unwrap();
        writeln!(file, "unescape_entities = true").unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.output_set_parameter, "targetAS");
        assert!(config.unescape_entities);
        assert_eq!(config.input_set_parameter, "inputAS");
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        let err = SessionConfig::from_toml_str("unescape_entities = \"yes\"").unwrap_err();
        assert!(matches!(err, ProtocolError::Config { .. }), "{:?}", err);
    }
}
