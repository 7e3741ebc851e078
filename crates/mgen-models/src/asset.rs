//! Artifact asset types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category an artifact is filed under inside its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Characters,
    Scenes,
    Objects,
    Frames,
    Videos,
    Images,
    Temp,
}

impl AssetType {
    pub const ALL: [AssetType; 7] = [
        AssetType::Characters,
        AssetType::Scenes,
        AssetType::Objects,
        AssetType::Frames,
        AssetType::Videos,
        AssetType::Images,
        AssetType::Temp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Characters => "characters",
            AssetType::Scenes => "scenes",
            AssetType::Objects => "objects",
            AssetType::Frames => "frames",
            AssetType::Videos => "videos",
            AssetType::Images => "images",
            AssetType::Temp => "temp",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown asset type: {}", s))
    }
}
