//! Prubin command - prune binaries from an existing buildspace tree.

use anyhow::{Context, Result};
use buildkit::{prune_tree, Config};
use clap::Args;
use console::style;
use std::path::PathBuf;

use crate::bundle_args::{BundleArgs, DEFAULT_TREE};

#[derive(Args, Debug)]
pub struct PrubinArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Buildspace tree to prune
    #[arg(short = 't', long, value_name = "TREE", default_value = DEFAULT_TREE)]
    pub tree: PathBuf,
}

pub fn execute(args: PrubinArgs, config: &Config) -> Result<i32> {
    let bundle = args.bundle.load(config)?;
    let report = prune_tree(&bundle, &args.tree)
        .with_context(|| format!("Failed to prune {}", args.tree.display()))?;

    for pattern in &report.unmatched_patterns {
        println!("{} {}", style("Not found:").yellow(), pattern);
    }
    println!(
        "{} Pruned {} paths",
        style("Success:").green().bold(),
        report.removed.len()
    );
    Ok(0)
}
