//! Resolved config bundles: a base chain layered into one configuration.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use super::artifacts::{BundleArtifacts, ExtraDependency, SourceDescriptor, SubstitutionRule};
use super::meta::BundleMeta;
use super::store::{BundleStore, PATCHES_DIR};
use crate::error::BundleError;
use crate::tree::SUBSTITUTION_RECORD;
use crate::util::{is_safe_relative_path, validate_bundle_name};

/// Longest base chain accepted before it is treated as a cycle
pub const MAX_BASE_CHAIN: usize = 32;

/// Where a resolved bundle came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleKind {
    /// Layered from the read-only bundles of a resources directory
    Base { resources_dir: PathBuf },
    /// A generated, flat bundle that may be modified in place
    User { path: PathBuf },
}

/// A bundle with its whole base chain merged in
#[derive(Debug, Clone)]
pub struct ConfigBundle {
    name: String,
    meta: BundleMeta,
    dependencies: Vec<String>,
    artifacts: BundleArtifacts,
    kind: BundleKind,
}

impl ConfigBundle {
    /// Resolve a base bundle and every ancestor of it
    pub fn from_base_name(store: &BundleStore, name: &str) -> Result<Self, BundleError> {
        let chain = walk_chain(store, name)?;

        let mut artifacts = BundleArtifacts::default();
        let mut dependencies = Vec::with_capacity(chain.len());
        let mut meta = None;
        for bundle in chain.into_iter().rev() {
            artifacts.merge(&bundle.artifacts);
            dependencies.push(bundle.name);
            meta = Some(bundle.meta);
        }

        // walk_chain always yields at least the leaf
        let meta = meta.ok_or_else(|| BundleError::NotFound {
            name: name.to_string(),
        })?;

        info!(
            "Resolved bundle {} ({})",
            name,
            dependencies.join(" -> ")
        );

        Ok(Self {
            name: name.to_string(),
            meta,
            dependencies,
            artifacts,
            kind: BundleKind::Base {
                resources_dir: store.resources_dir().to_path_buf(),
            },
        })
    }

    /// Load a generated user bundle; it is never re-merged
    pub fn from_user_path(path: &Path) -> Result<Self, BundleError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if !path.is_dir() {
            return Err(BundleError::NotFound { name });
        }

        let meta = BundleMeta::load(path, &name)?;
        if let Some(base) = &meta.base {
            return Err(BundleError::InvalidBaseBundle {
                name,
                reason: format!("user bundles are flat but this one names base '{}'", base),
            });
        }

        let artifacts = BundleArtifacts::load(path)?;
        debug!("Loaded user bundle from {}", path.display());

        Ok(Self {
            dependencies: vec![name.clone()],
            name,
            meta,
            artifacts,
            kind: BundleKind::User {
                path: path.to_path_buf(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &BundleMeta {
        &self.meta
    }

    pub fn kind(&self) -> &BundleKind {
        &self.kind
    }

    pub fn is_user_bundle(&self) -> bool {
        matches!(self.kind, BundleKind::User { .. })
    }

    /// Bundle names from the root to this bundle
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn artifacts(&self) -> &BundleArtifacts {
        &self.artifacts
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.artifacts.source
    }

    pub fn extra_deps(&self) -> &IndexMap<String, ExtraDependency> {
        &self.artifacts.extra_deps
    }

    pub fn gn_flags(&self) -> &IndexMap<String, String> {
        &self.artifacts.gn_flags
    }

    pub fn patches(&self) -> &IndexSet<String> {
        &self.artifacts.patches
    }

    pub fn pruning(&self) -> &IndexSet<String> {
        &self.artifacts.pruning
    }

    pub fn domain_regex(&self) -> &IndexSet<SubstitutionRule> {
        &self.artifacts.domain_regex
    }

    pub fn domain_substitution(&self) -> &IndexSet<String> {
        &self.artifacts.domain_substitution
    }

    /// Directory the patch list is relative to
    pub fn patches_dir(&self) -> PathBuf {
        match &self.kind {
            BundleKind::Base { resources_dir } => resources_dir.join(PATCHES_DIR),
            BundleKind::User { path } => path.join(PATCHES_DIR),
        }
    }

    /// Substitution record for the patches scope; base bundles have none
    pub fn substitution_record_path(&self) -> Option<PathBuf> {
        match &self.kind {
            BundleKind::Base { .. } => None,
            BundleKind::User { path } => Some(path.join(SUBSTITUTION_RECORD)),
        }
    }

    /// Materialize this bundle as a flat user bundle at `path`.
    ///
    /// The bundle is assembled in a sibling staging directory and renamed
    /// into place, so `path` either holds a complete bundle or nothing.
    pub fn write(&self, path: &Path) -> Result<(), BundleError> {
        if path.exists() {
            return Err(BundleError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| BundleError::io(&parent, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".bundle-")
            .tempdir_in(&parent)
            .map_err(|e| BundleError::io(&parent, e))?;

        let meta = BundleMeta {
            display_name: self.meta.display_name.clone(),
            base: None,
            notes: self.meta.notes.clone(),
        };
        meta.write(staging.path())?;
        self.artifacts.write(staging.path())?;
        self.copy_patches(&staging.path().join(PATCHES_DIR))?;

        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, path) {
            let _ = fs::remove_dir_all(&staged);
            return Err(BundleError::io(path, e));
        }

        info!("Generated user bundle {} at {}", self.name, path.display());
        Ok(())
    }

    fn copy_patches(&self, dest_root: &Path) -> Result<(), BundleError> {
        let source_root = self.patches_dir();
        fs::create_dir_all(dest_root).map_err(|e| BundleError::io(dest_root, e))?;

        for patch in &self.artifacts.patches {
            let relative = Path::new(patch);
            if !is_safe_relative_path(relative) {
                return Err(BundleError::InvalidBaseBundle {
                    name: self.name.clone(),
                    reason: format!("patch path '{}' leaves the patches directory", patch),
                });
            }

            let source = source_root.join(relative);
            if !source.is_file() {
                return Err(BundleError::InvalidBaseBundle {
                    name: self.name.clone(),
                    reason: format!("patch '{}' not found in {}", patch, source_root.display()),
                });
            }

            let dest = dest_root.join(relative);
            if let Some(dir) = dest.parent() {
                fs::create_dir_all(dir).map_err(|e| BundleError::io(dir, e))?;
            }
            fs::copy(&source, &dest).map_err(|e| BundleError::io(&source, e))?;
        }

        debug!("Copied {} patches", self.artifacts.patches.len());
        Ok(())
    }
}

/// Dependency order of a base bundle, root first, without merging artifacts
pub fn list_dependency_order(store: &BundleStore, name: &str) -> Result<Vec<String>, BundleError> {
    Ok(walk_chain(store, name)?
        .into_iter()
        .rev()
        .map(|bundle| bundle.name)
        .collect())
}

/// Load the chain from the leaf up to its root (leaf first)
fn walk_chain(
    store: &BundleStore,
    name: &str,
) -> Result<Vec<super::store::RawBundle>, BundleError> {
    let mut visited: IndexSet<String> = IndexSet::new();
    let mut chain = Vec::new();
    let mut current = Some(name.to_string());

    while let Some(bundle_name) = current.take() {
        if let Some(index) = visited.get_index_of(&bundle_name) {
            let mut cycle: Vec<String> = visited.iter().skip(index).cloned().collect();
            cycle.push(bundle_name);
            return Err(BundleError::CyclicDependency { chain: cycle });
        }
        if visited.len() >= MAX_BASE_CHAIN {
            let mut overlong: Vec<String> = visited.into_iter().collect();
            overlong.push(bundle_name);
            return Err(BundleError::CyclicDependency { chain: overlong });
        }

        let bundle = store.load(&bundle_name)?;
        if let Some(base) = &bundle.meta.base {
            validate_bundle_name(base).map_err(|reason| BundleError::InvalidBaseBundle {
                name: bundle_name.clone(),
                reason: format!("bad base reference '{}': {}", base, reason),
            })?;
            current = Some(base.clone());
        }

        visited.insert(bundle_name);
        chain.push(bundle);
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::store::CONFIG_BUNDLES_DIR;
    use tempfile::TempDir;

    fn add_bundle(resources: &Path, name: &str, base: Option<&str>) -> PathBuf {
        let dir = resources.join(CONFIG_BUNDLES_DIR).join(name);
        fs::create_dir_all(&dir).unwrap();
        let mut meta = format!("display_name = \"{}\"\n", name.to_uppercase());
        if let Some(base) = base {
            meta.push_str(&format!("base = \"{}\"\n", base));
        }
        fs::write(dir.join("bundlemeta.toml"), meta).unwrap();
        dir
    }

    #[test]
    fn test_dependency_order_root_first() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "common", None);
        add_bundle(temp_dir.path(), "linux_rooted", Some("common"));
        add_bundle(temp_dir.path(), "debian", Some("linux_rooted"));

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let order = list_dependency_order(&store, "debian").unwrap();

        assert_eq!(order, vec!["common", "linux_rooted", "debian"]);
    }

    #[test]
    fn test_cycle_is_reported_with_chain() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "a", Some("b"));
        add_bundle(temp_dir.path(), "b", Some("c"));
        add_bundle(temp_dir.path(), "c", Some("b"));

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let err = ConfigBundle::from_base_name(&store, "a").unwrap_err();

        match err {
            BundleError::CyclicDependency { chain } => assert_eq!(chain, vec!["b", "c", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "loop", Some("loop"));

        let store = BundleStore::open(temp_dir.path()).unwrap();
        assert!(matches!(
            list_dependency_order(&store, "loop").unwrap_err(),
            BundleError::CyclicDependency { .. }
        ));
    }

    #[test]
    fn test_overlong_chain_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "b0", None);
        for i in 1..=MAX_BASE_CHAIN {
            add_bundle(temp_dir.path(), &format!("b{}", i), Some(&format!("b{}", i - 1)));
        }

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let leaf = format!("b{}", MAX_BASE_CHAIN);
        assert!(matches!(
            list_dependency_order(&store, &leaf).unwrap_err(),
            BundleError::CyclicDependency { .. }
        ));
        // one shorter fits exactly
        let order = list_dependency_order(&store, &format!("b{}", MAX_BASE_CHAIN - 1)).unwrap();
        assert_eq!(order.len(), MAX_BASE_CHAIN);
    }

    #[test]
    fn test_missing_base_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "orphan", Some("nowhere"));

        let store = BundleStore::open(temp_dir.path()).unwrap();
        assert!(matches!(
            ConfigBundle::from_base_name(&store, "orphan").unwrap_err(),
            BundleError::NotFound { ref name } if name == "nowhere"
        ));
    }

    #[test]
    fn test_malformed_base_reference() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "child", Some("../escape"));

        let store = BundleStore::open(temp_dir.path()).unwrap();
        assert!(matches!(
            ConfigBundle::from_base_name(&store, "child").unwrap_err(),
            BundleError::InvalidBaseBundle { ref name, .. } if name == "child"
        ));
    }

    #[test]
    fn test_write_refuses_existing_path() {
        let temp_dir = TempDir::new().unwrap();
        add_bundle(temp_dir.path(), "common", None);
        let store = BundleStore::open(temp_dir.path()).unwrap();
        let bundle = ConfigBundle::from_base_name(&store, "common").unwrap();

        let target = temp_dir.path().join("user_bundle");
        fs::create_dir(&target).unwrap();

        assert!(matches!(
            bundle.write(&target).unwrap_err(),
            BundleError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn test_write_missing_patch_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = add_bundle(temp_dir.path(), "common", None);
        fs::write(dir.join("patch_order.list"), "core/missing.patch\n").unwrap();

        let store = BundleStore::open(temp_dir.path()).unwrap();
        let bundle = ConfigBundle::from_base_name(&store, "common").unwrap();
        let target = temp_dir.path().join("out").join("user_bundle");

        assert!(matches!(
            bundle.write(&target).unwrap_err(),
            BundleError::InvalidBaseBundle { .. }
        ));
        assert!(!target.exists());
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("out")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_user_bundle_with_base_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("bundlemeta.toml"),
            "display_name = \"User\"\nbase = \"common\"\n",
        )
        .unwrap();

        assert!(matches!(
            ConfigBundle::from_user_path(temp_dir.path()).unwrap_err(),
            BundleError::InvalidBaseBundle { .. }
        ));
    }
}
