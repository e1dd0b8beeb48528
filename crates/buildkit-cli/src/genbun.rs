//! Genbun command - materialize a base bundle as a user bundle.

use anyhow::{Context, Result};
use buildkit::{BundleStore, Config, ConfigBundle};
use clap::Args;
use console::style;
use std::path::PathBuf;

use crate::bundle_args::DEFAULT_USER_BUNDLE;

#[derive(Args, Debug)]
pub struct GenbunArgs {
    /// Base bundle to generate from
    pub name: String,

    /// Where to write the user bundle; must not exist
    #[arg(short = 'u', long = "user-bundle", value_name = "PATH", default_value = DEFAULT_USER_BUNDLE)]
    pub user_bundle: PathBuf,
}

pub fn execute(args: GenbunArgs, config: &Config) -> Result<i32> {
    let store = BundleStore::open(config.get_resources_dir())?;
    let bundle = ConfigBundle::from_base_name(&store, &args.name)
        .with_context(|| format!("Failed to resolve bundle {}", args.name))?;

    bundle
        .write(&args.user_bundle)
        .with_context(|| format!("Failed to generate user bundle at {}", args.user_bundle.display()))?;

    println!(
        "{} Generated user bundle {} from {}",
        style("Success:").green().bold(),
        args.user_bundle.display(),
        bundle.dependencies().join(" -> ")
    );
    Ok(0)
}
