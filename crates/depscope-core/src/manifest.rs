//! `package.json` fields the graph builder and enrichers need

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_FILE: &str = "package.json";

/// A loosely typed `package.json`. Fields whose shape varies across the
/// ecosystem (license, author, exports...) are kept as raw JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
    pub exports: Option<Value>,
    pub license: Option<Value>,
    pub author: Option<Value>,
    pub repository: Option<Value>,
    pub funding: Option<Value>,
    pub engines: Option<Value>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    pub package_manager: Option<String>,
}

impl PackageManifest {
    /// Read `package.json` from a package directory.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// The `types` field, falling back to the older `typings` spelling.
    pub fn types_entry(&self) -> Option<&str> {
        self.types.as_deref().or(self.typings.as_deref())
    }
}
