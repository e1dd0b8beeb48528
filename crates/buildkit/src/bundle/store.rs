//! Access to the base bundles shipped under a resources directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::artifacts::BundleArtifacts;
use super::meta::BundleMeta;
use crate::error::BundleError;
use crate::util::validate_bundle_name;

pub const CONFIG_BUNDLES_DIR: &str = "config_bundles";
pub const PATCHES_DIR: &str = "patches";

/// One entry of a bundle listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub name: String,
    pub display_name: String,
}

/// A single bundle as stored on disk, before any layering
#[derive(Debug, Clone)]
pub struct RawBundle {
    pub name: String,
    pub meta: BundleMeta,
    pub artifacts: BundleArtifacts,
}

/// Read-only view of `<resources>/config_bundles` and `<resources>/patches`
#[derive(Debug, Clone)]
pub struct BundleStore {
    resources_dir: PathBuf,
}

impl BundleStore {
    /// Create a store without touching the filesystem
    pub fn new(resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            resources_dir: resources_dir.into(),
        }
    }

    /// Create a store, failing if the resources directory has no bundles
    pub fn open(resources_dir: impl Into<PathBuf>) -> Result<Self, BundleError> {
        let store = Self::new(resources_dir);
        if !store.bundles_dir().is_dir() {
            return Err(BundleError::ResourcesMissing {
                path: store.bundles_dir(),
            });
        }
        Ok(store)
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.resources_dir.join(CONFIG_BUNDLES_DIR)
    }

    /// Directory that base bundle patch lists are relative to
    pub fn patches_dir(&self) -> PathBuf {
        self.resources_dir.join(PATCHES_DIR)
    }

    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.bundles_dir().join(name)
    }

    /// List every bundle with its display name, sorted by name
    pub fn list(&self) -> Result<Vec<BundleSummary>, BundleError> {
        let dir = self.bundles_dir();
        let entries = fs::read_dir(&dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BundleError::ResourcesMissing { path: dir.clone() },
            _ => BundleError::io(&dir, e),
        })?;

        let mut bundles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BundleError::io(&dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_bundle_name(&name).is_err() {
                debug!("Skipping non-bundle directory {}", entry.path().display());
                continue;
            }
            let meta = BundleMeta::load(&entry.path(), &name)?;
            bundles.push(BundleSummary {
                name,
                display_name: meta.display_name,
            });
        }

        bundles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(bundles)
    }

    fn checked_dir(&self, name: &str) -> Result<PathBuf, BundleError> {
        validate_bundle_name(name).map_err(|reason| BundleError::InvalidBaseBundle {
            name: name.to_string(),
            reason,
        })?;
        let dir = self.bundle_dir(name);
        if !dir.is_dir() {
            return Err(BundleError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(dir)
    }

    /// Load one bundle's metadata and artifacts without following its base
    pub fn load(&self, name: &str) -> Result<RawBundle, BundleError> {
        let dir = self.checked_dir(name)?;
        debug!("Loading bundle {} from {}", name, dir.display());
        Ok(RawBundle {
            name: name.to_string(),
            meta: BundleMeta::load(&dir, name)?,
            artifacts: BundleArtifacts::load(&dir)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_bundle(resources: &Path, name: &str, meta: &str) {
        let dir = resources.join(CONFIG_BUNDLES_DIR).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bundlemeta.toml"), meta).unwrap();
    }

    #[test]
    fn test_open_requires_bundles_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = BundleStore::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, BundleError::ResourcesMissing { .. }));
    }

    #[test]
    fn test_list_sorted_by_name() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "windows", "display_name = \"Windows\"\n");
        add_bundle(temp_dir.path(), "common", "display_name = \"Common\"\n");
        add_bundle(
            temp_dir.path(),
            "linux_rooted",
            "display_name = \"Linux (rooted)\"\nbase = \"common\"\n",
        );

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|b| b.name).collect();

        assert_eq!(names, vec!["common", "linux_rooted", "windows"]);
    }

    #[test]
    fn test_load_unknown_bundle() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "common", "display_name = \"Common\"\n");
        let store = BundleStore::open(temp_dir.path()).unwrap();

        assert!(matches!(
            store.load("missing").unwrap_err(),
            BundleError::NotFound { ref name } if name == "missing"
        ));
        assert!(matches!(
            store.load("../common").unwrap_err(),
            BundleError::InvalidBaseBundle { .. }
        ));
    }

    #[test]
    fn test_load_reads_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "common", "display_name = \"Common\"\n");
        fs::write(
            temp_dir.path().join("config_bundles/common/pruning.list"),
            "*.so\n",
        )
        .unwrap();

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let bundle = store.load("common").unwrap();

        assert_eq!(bundle.meta.display_name, "Common");
        assert!(bundle.artifacts.pruning.contains("*.so"));
    }
}
