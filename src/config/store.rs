use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The token store backends. We differentiate them via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// Tokens live as long as the process.
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// Tokens are persisted to a JSON file and survive restarts.
    #[serde(rename = "file")]
    File(FileStoreConfig),
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq, Eq)]
pub struct FileStoreConfig {
    pub path: PathBuf,
}
