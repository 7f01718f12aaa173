use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::watch::DEFAULT_DEBOUNCE;

pub const CONFIG_ENV_VAR: &str = "PAKWATCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config {path} is invalid: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Debounce period and the argv templates of the external asset tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub debounce_ms: u64,
    pub xml_to_yax: Vec<String>,
    pub compile_script: Vec<String>,
    pub repack_pak: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            xml_to_yax: argv(&["xml2yax", "{input}", "{output}"]),
            compile_script: argv(&["mrbc", "-o", "{output}", "{input}"]),
            repack_pak: argv(&["pakrepack", "{folder}", "{output}"]),
        }
    }
}

impl ToolConfig {
    /// Defaults when `path` is `None`; fields missing from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Self>(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            let source = error.into_inner();
            let message = if field.is_empty() || field == "." {
                source.to_string()
            } else {
                format!("at {field}: {source}")
            };
            ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let config = ToolConfig::load(None).expect("defaults");
        assert_eq!(config.debounce(), Duration::from_millis(150));
        assert_eq!(config.repack_pak[0], "pakrepack");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("pakwatch.json");
        fs::write(&path, r#"{"debounce_ms": 400, "xml_to_yax": ["conv", "{input}"]}"#)
            .expect("write config");

        let config = ToolConfig::load(Some(&path)).expect("load");
        assert_eq!(config.debounce_ms, 400);
        assert_eq!(config.xml_to_yax, vec!["conv", "{input}"]);
        assert_eq!(config.compile_script, ToolConfig::default().compile_script);
    }

    #[test]
    fn parse_errors_name_the_field() {
        let error = ToolConfig::parse(Path::new("c.json"), r#"{"repack_pak": [1]}"#)
            .expect_err("wrong type");
        let text = error.to_string();
        assert!(text.contains("repack_pak[0]"), "{text}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = ToolConfig::parse(Path::new("c.json"), r#"{"debounce": 1}"#)
            .expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let temp = TempDir::new().expect("temp");
        let missing = temp.path().join("nope.json");
        let error = ToolConfig::load(Some(&missing)).expect_err("missing");
        assert!(matches!(error, ConfigError::Read { path, .. } if path == missing));
    }
}
