//! Bundle selection shared by the commands that operate on a bundle.

use anyhow::{Context, Result};
use buildkit::{BundleStore, Config, ConfigBundle};
use clap::Args;
use std::path::PathBuf;

/// Default location of a generated user bundle
pub const DEFAULT_USER_BUNDLE: &str = "buildspace/user_bundle";

/// Default location of the buildspace tree
pub const DEFAULT_TREE: &str = "buildspace/tree";

#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    /// Base bundle to use (read-only)
    #[arg(short = 'b', long = "base-bundle", value_name = "NAME", conflicts_with = "user_bundle")]
    pub base_bundle: Option<String>,

    /// User bundle to use [default: buildspace/user_bundle]
    #[arg(short = 'u', long = "user-bundle", value_name = "PATH")]
    pub user_bundle: Option<PathBuf>,
}

impl BundleArgs {
    /// Resolve the selected bundle; without flags the default user bundle
    pub fn load(&self, config: &Config) -> Result<ConfigBundle> {
        match &self.base_bundle {
            Some(name) => {
                let store = BundleStore::open(config.get_resources_dir())?;
                ConfigBundle::from_base_name(&store, name)
                    .with_context(|| format!("Failed to load base bundle {}", name))
            }
            None => {
                let path = self.user_bundle_path();
                ConfigBundle::from_user_path(&path)
                    .with_context(|| format!("Failed to load user bundle {}", path.display()))
            }
        }
    }

    pub fn user_bundle_path(&self) -> PathBuf {
        self.user_bundle
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USER_BUNDLE))
    }
}
