use anyhow::{Context, Result};
use buildkit::Config;
use std::path::Path;

/// Load `buildkit.toml` by searching upward from the working directory,
/// then apply the `--resources` flag on top
pub fn load(resources: Option<&Path>) -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    load_from(&cwd, true, resources)
}

fn load_from(start_dir: &Path, use_environment: bool, resources: Option<&Path>) -> Result<Config> {
    let mut config =
        Config::build(Some(start_dir), use_environment).context("Failed to load configuration")?;

    if let Some(resources) = resources {
        config.set_resources_dir(resources);
    }

    log::debug!("Resources directory: {}", config.get_resources_dir().display());
    Ok(config)
}
