use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(skip)]
    pub debug_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub tlscert: Option<String>,
    #[serde(default)]
    pub tlskey: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            tlscert: None,
            tlskey: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Directory holding the mapping, parameter and weight files
    /// written by `neumf-train`.
    #[serde(default = "default_model_dir")]
    pub dir: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
        }
    }
}

/// Static descriptive fields served on `/model/metadata`. These come
/// straight from configuration and are independent of the loaded model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    #[serde(default = "default_model_id")]
    pub id: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_description")]
    pub description: String,
    #[serde(default = "default_model_license")]
    pub license: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            name: default_model_name(),
            description: default_model_description(),
            license: default_model_license(),
        }
    }
}

fn default_port() -> String {
    "5000".to_string()
}

fn default_model_dir() -> String {
    "assets".to_string()
}

fn default_model_id() -> String {
    "neumf".to_string()
}

fn default_model_name() -> String {
    "NeuMF Recommender".to_string()
}

fn default_model_description() -> String {
    "Generate personalized recommendations".to_string()
}

fn default_model_license() -> String {
    "Apache-2.0".to_string()
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_string(), e))?;

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
}
