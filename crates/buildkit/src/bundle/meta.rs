//! Bundle metadata (`bundlemeta.toml`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BundleError;

pub const BUNDLE_META: &str = "bundlemeta.toml";

/// Metadata of a single bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    /// Human readable name shown by bundle listings
    pub display_name: String,

    /// Parent bundle in the inheritance chain; `None` for a root bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BundleMeta {
    /// Load `bundlemeta.toml` from a bundle directory.
    ///
    /// The metadata file is the one required artifact; `name` is only used to
    /// report which bundle is broken.
    pub fn load(bundle_dir: &Path, name: &str) -> Result<Self, BundleError> {
        let path = bundle_dir.join(BUNDLE_META);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BundleError::InvalidBaseBundle {
                    name: name.to_string(),
                    reason: format!("missing {}", BUNDLE_META),
                });
            }
            Err(e) => return Err(BundleError::io(path, e)),
        };

        let meta: BundleMeta = toml::from_str(&content).map_err(|e| BundleError::parse(&path, e))?;

        if meta.display_name.trim().is_empty() {
            return Err(BundleError::InvalidBaseBundle {
                name: name.to_string(),
                reason: "display_name is empty".to_string(),
            });
        }

        Ok(meta)
    }

    pub fn write(&self, bundle_dir: &Path) -> Result<(), BundleError> {
        let path = bundle_dir.join(BUNDLE_META);
        let content = toml::to_string(self).map_err(|e| BundleError::parse(&path, e))?;
        fs::write(&path, content).map_err(|e| BundleError::io(path, e))
    }
}
