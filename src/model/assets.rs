//! On-disk layout of a trained model.
//!
//! `neumf-train` writes four files into the asset directory and the server
//! reads the same four back. Keeping both codecs in one module means the
//! formats cannot drift apart.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ncf::NeuMf;

pub const USER_MAPPING_FILE: &str = "user_mapping.json";
pub const ITEM_MAPPING_FILE: &str = "item_mapping.json";
pub const PARAMETERS_FILE: &str = "parameters.json";
pub const WEIGHTS_FILE: &str = "weights.bin";

/// Scalar hyperparameters that shaped the trained network, saved next to
/// the weights so the server can reconstruct the architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub n_users: usize,
    pub n_items: usize,
    pub factors: usize,
    pub layer_sizes: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

/// Everything the training run produced: the two ID mappings, the
/// parameter bundle and the trained network.
pub struct ModelAssets {
    pub user_mapping: HashMap<String, usize>,
    pub item_mapping: HashMap<String, usize>,
    pub parameters: Parameters,
    pub network: NeuMf,
}

impl ModelAssets {
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let user_mapping: HashMap<String, usize> = read_json(&dir.join(USER_MAPPING_FILE))?;
        let item_mapping: HashMap<String, usize> = read_json(&dir.join(ITEM_MAPPING_FILE))?;
        let parameters: Parameters = read_json(&dir.join(PARAMETERS_FILE))?;

        let weights_path = dir.join(WEIGHTS_FILE);
        let bytes = fs::read(&weights_path).map_err(|e| ModelError::ReadAsset {
            path: weights_path.display().to_string(),
            source: e,
        })?;
        let network: NeuMf =
            bincode::deserialize(&bytes).map_err(|e| ModelError::DecodeWeights {
                path: weights_path.display().to_string(),
                source: e,
            })?;

        let assets = Self {
            user_mapping,
            item_mapping,
            parameters,
            network,
        };
        assets.validate()?;
        Ok(assets)
    }

    pub fn save(&self, dir: &Path) -> Result<(), ModelError> {
        fs::create_dir_all(dir).map_err(|e| ModelError::WriteAsset {
            path: dir.display().to_string(),
            source: e,
        })?;

        write_json(&dir.join(USER_MAPPING_FILE), &self.user_mapping)?;
        write_json(&dir.join(ITEM_MAPPING_FILE), &self.item_mapping)?;
        write_json(&dir.join(PARAMETERS_FILE), &self.parameters)?;

        let weights_path = dir.join(WEIGHTS_FILE);
        let bytes =
            bincode::serialize(&self.network).map_err(|e| ModelError::EncodeWeights {
                source: e,
            })?;
        fs::write(&weights_path, bytes).map_err(|e| ModelError::WriteAsset {
            path: weights_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// The mapping tables, the parameter bundle and the network must agree
    /// on the user/item counts; a mismatch means the asset directory holds
    /// files from different training runs.
    fn validate(&self) -> Result<(), ModelError> {
        let checks = [
            ("users", self.user_mapping.len(), self.parameters.n_users),
            ("items", self.item_mapping.len(), self.parameters.n_items),
            ("network users", self.network.n_users, self.parameters.n_users),
            ("network items", self.network.n_items, self.parameters.n_items),
        ];
        for (what, got, expected) in checks {
            if got != expected {
                return Err(ModelError::Inconsistent {
                    what,
                    got,
                    expected,
                });
            }
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let content = fs::read_to_string(path).map_err(|e| ModelError::ReadAsset {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ModelError::ParseAsset {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ModelError> {
    let content = serde_json::to_string(value).map_err(|e| ModelError::SerializeAsset {
        path: path.display().to_string(),
        source: e,
    })?;
    fs::write(path, content).map_err(|e| ModelError::WriteAsset {
        path: path.display().to_string(),
        source: e,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read model asset {path}: {source}")]
    ReadAsset {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse model asset {path}: {source}")]
    ParseAsset {
        path: String,
        source: serde_json::Error,
    },
    #[error("Failed to serialize model asset {path}: {source}")]
    SerializeAsset {
        path: String,
        source: serde_json::Error,
    },
    #[error("Failed to write model asset {path}: {source}")]
    WriteAsset {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to decode weights {path}: {source}")]
    DecodeWeights {
        path: String,
        source: bincode::Error,
    },
    #[error("Failed to encode weights: {source}")]
    EncodeWeights { source: bincode::Error },
    #[error("Inconsistent model assets: {what} is {got}, parameters say {expected}")]
    Inconsistent {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("Mapping table is not a dense index: bad index {index}")]
    BadMapping { index: usize },
}
