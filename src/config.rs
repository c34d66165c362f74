//! Engine configuration
//!
//! Read from YAML or JSON, picked by file extension. Parser configuration
//! files listed in the engine config are resolved relative to the file
//! that names them.

use crate::adapter::{ParserConfig, DEFAULT_WIDGET_ELEMENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported configuration format: {} (expected .json, .yaml or .yml)", .0.display())]
    UnsupportedFormat(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Tag name of widget elements
    pub widget_element: String,
    /// Selector of the observed element; the body when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observe: Option<String>,
    /// Declarative namespaces to attach; every supplied configuration when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsers: Option<Vec<String>>,
    /// Inline parser configurations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parser_configs: Vec<ParserConfig>,
    /// Parser configuration files, one configuration each
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parser_config_files: Vec<PathBuf>,
    #[serde(skip)]
    pub(crate) base_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            widget_element: DEFAULT_WIDGET_ELEMENT.to_string(),
            observe: None,
            parsers: None,
            parser_configs: Vec::new(),
            parser_config_files: Vec::new(),
            base_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn with_parser_config(mut self, config: ParserConfig) -> Self {
        self.parser_configs.push(config);
        self
    }

    pub fn with_observe(mut self, selector: impl Into<String>) -> Self {
        self.observe = Some(selector.into());
        self
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let mut config: Self = read_file(path)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// All parser configurations: inline entries first, then files in order.
    pub fn load_parser_configs(&self) -> ConfigResult<Vec<ParserConfig>> {
        let mut configs = self.parser_configs.clone();
        for file in &self.parser_config_files {
            let path = match &self.base_dir {
                Some(base) if file.is_relative() => base.join(file),
                _ => file.clone(),
            };
            configs.push(read_file(&path)?);
        }
        Ok(configs)
    }
}

/// Default engine config location (`<config dir>/semtree/config.yaml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("semtree").join("config.yaml"))
}

/// Read a parser configuration from a `.json`, `.yaml` or `.yml` file.
pub fn read_parser_config(path: impl AsRef<Path>) -> ConfigResult<ParserConfig> {
    read_file(path.as_ref())
}

fn read_file<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let format = match extension.as_deref() {
        Some("json") => Format::Json,
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match format {
        Format::Json => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Format::Yaml => serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

enum Format {
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: EngineConfig = serde_yaml::from_str("observe: main").unwrap();
        assert_eq!(config.widget_element, "bos-component");
        assert_eq!(config.observe.as_deref(), Some("main"));
        assert!(config.parsers.is_none());
        assert!(config.parser_configs.is_empty());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = EngineConfig::from_file("engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
