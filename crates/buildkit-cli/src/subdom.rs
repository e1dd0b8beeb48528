//! Subdom command - apply domain substitution to the tree and/or patches.

use anyhow::{Context, Result};
use buildkit::{substitute_domains, Config, SubstitutionScope};
use clap::{Args, ValueEnum};
use console::style;
use std::path::PathBuf;

use crate::bundle_args::{BundleArgs, DEFAULT_TREE};

/// A single component to operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnlyArg {
    Tree,
    Patches,
}

impl OnlyArg {
    /// Scope for an optional `-o`; both components without it
    pub fn scope(only: Option<OnlyArg>) -> SubstitutionScope {
        match only {
            Some(OnlyArg::Tree) => SubstitutionScope::Tree,
            Some(OnlyArg::Patches) => SubstitutionScope::Patches,
            None => SubstitutionScope::Both,
        }
    }
}

#[derive(Args, Debug)]
pub struct SubdomArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Buildspace tree to substitute
    #[arg(short = 't', long, value_name = "TREE", default_value = DEFAULT_TREE)]
    pub tree: PathBuf,

    /// Apply domain substitution to only this component
    #[arg(short = 'o', long = "only", value_enum)]
    pub only: Option<OnlyArg>,
}

pub fn execute(args: SubdomArgs, config: &Config) -> Result<i32> {
    let bundle = args.bundle.load(config)?;
    let scope = OnlyArg::scope(args.only);

    let summary = substitute_domains(&bundle, &args.tree, scope)
        .with_context(|| format!("Domain substitution ({}) failed", scope))?;

    if let Some(tree) = &summary.tree {
        println!(
            "{} tree: {} files substituted, {} missing, {} symlinks skipped",
            style("Domain substitution").green(),
            tree.modified.len(),
            tree.missing.len(),
            tree.links.len()
        );
    }
    if let Some(patches) = &summary.patches {
        println!(
            "{} patches: {} files substituted, {} missing, {} symlinks skipped",
            style("Domain substitution").green(),
            patches.modified.len(),
            patches.missing.len(),
            patches.links.len()
        );
    }
    Ok(0)
}
