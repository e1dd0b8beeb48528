//! Bunnfo command - list base bundles or show a bundle's dependency order.

use anyhow::{Context, Result};
use buildkit::{list_dependency_order, BundleStore, Config};
use clap::{ArgGroup, Args};
use console::style;

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mode").required(true).args(["list", "dependencies"])))]
pub struct BunnfoArgs {
    /// List all base bundles and their display names
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Print the dependency order of a base bundle, root first
    #[arg(short = 'd', long, value_name = "NAME")]
    pub dependencies: Option<String>,
}

pub fn execute(args: BunnfoArgs, config: &Config) -> Result<i32> {
    let store = BundleStore::open(config.get_resources_dir())?;

    if args.list {
        let bundles = store.list().context("Failed to list base bundles")?;
        for bundle in bundles {
            println!("{} - {}", style(&bundle.name).green(), bundle.display_name);
        }
    }

    if let Some(name) = &args.dependencies {
        let order = list_dependency_order(&store, name)
            .with_context(|| format!("Failed to resolve bundle {}", name))?;
        for dependency in order {
            println!("{}", dependency);
        }
    }

    Ok(0)
}
