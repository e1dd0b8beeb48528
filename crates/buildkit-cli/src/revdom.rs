//! Revdom command - restore files from the domain substitution records.

use anyhow::{Context, Result};
use buildkit::{revert_domains, Config};
use clap::Args;
use console::style;
use std::path::PathBuf;

use crate::bundle_args::{BundleArgs, DEFAULT_TREE};
use crate::subdom::OnlyArg;

#[derive(Args, Debug)]
pub struct RevdomArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Buildspace tree to revert
    #[arg(short = 't', long, value_name = "TREE", default_value = DEFAULT_TREE)]
    pub tree: PathBuf,

    /// Revert only this component
    #[arg(short = 'o', long = "only", value_enum)]
    pub only: Option<OnlyArg>,
}

pub fn execute(args: RevdomArgs, config: &Config) -> Result<i32> {
    let bundle = args.bundle.load(config)?;
    let scope = OnlyArg::scope(args.only);

    let summary = revert_domains(&bundle, &args.tree, scope)
        .with_context(|| format!("Reverting domain substitution ({}) failed", scope))?;

    if let Some(restored) = &summary.tree {
        println!("{} {} tree files", style("Restored").green(), restored.len());
    }
    if let Some(restored) = &summary.patches {
        println!("{} {} patches", style("Restored").green(), restored.len());
    }
    Ok(0)
}
