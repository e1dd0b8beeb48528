//! Getsrc command - download, verify, extract, prune and substitute sources.

use anyhow::{Context, Result};
use buildkit::downloader::DownloadOutcome;
use buildkit::progress::format_bytes;
use buildkit::{retrieve_and_extract, Config, RetrievalOptions, SubstitutionScope};
use clap::{Args, ValueEnum};
use console::style;
use std::path::PathBuf;

use crate::bundle_args::{BundleArgs, DEFAULT_TREE};

/// Which parts of the buildspace domain substitution touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SubstitutionArg {
    Tree,
    Patches,
    Both,
    None,
}

impl SubstitutionArg {
    pub fn scope(self) -> Option<SubstitutionScope> {
        match self {
            SubstitutionArg::Tree => Some(SubstitutionScope::Tree),
            SubstitutionArg::Patches => Some(SubstitutionScope::Patches),
            SubstitutionArg::Both => Some(SubstitutionScope::Both),
            SubstitutionArg::None => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct GetsrcArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Buildspace tree to create; must not exist
    #[arg(short = 't', long, value_name = "TREE", default_value = DEFAULT_TREE)]
    pub tree: PathBuf,

    /// Directory of downloaded archives; must exist
    #[arg(short = 'd', long, value_name = "DOWNLOADS", default_value = "buildspace/downloads")]
    pub downloads: PathBuf,

    /// Keep prebuilt binaries in the tree
    #[arg(long)]
    pub disable_binary_pruning: bool,

    /// Do not draw download progress bars
    #[arg(long)]
    pub hide_progress_bar: bool,

    /// Where to apply domain substitution
    #[arg(long, value_enum, default_value = "both")]
    pub substitution: SubstitutionArg,

    /// Number of concurrent downloads [default: from configuration]
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub jobs: Option<usize>,
}

pub async fn execute(args: GetsrcArgs, mut config: Config) -> Result<i32> {
    if let Some(jobs) = args.jobs {
        config.set_download_concurrency(jobs)?;
    }

    let bundle = args.bundle.load(&config)?;

    let options = RetrievalOptions {
        prune_binaries: !args.disable_binary_pruning,
        show_progress: !args.hide_progress_bar,
        substitution: args.substitution.scope(),
        ..RetrievalOptions::from_config(&config.download)
    };

    println!(
        "{} Retrieving sources for {}",
        style("buildkit").green().bold(),
        bundle.dependencies().join(" -> ")
    );

    let report = retrieve_and_extract(&bundle, &args.downloads, &args.tree, &options)
        .await
        .context("Source retrieval failed")?;

    for target in &report.targets {
        let status = match target.download {
            DownloadOutcome::AlreadyVerified => style("verified".to_string()).cyan(),
            DownloadOutcome::Downloaded { bytes } => {
                style(format!("downloaded {}", format_bytes(bytes))).green()
            }
        };
        println!(
            "  {} {} ({} files)",
            style(&target.name).white().bold(),
            status,
            target.extraction.files
        );
    }

    if let Some(pruned) = &report.pruned {
        println!("  pruned {} paths", pruned.removed.len());
        if !pruned.unmatched_patterns.is_empty() {
            println!(
                "  {} {} pruning patterns matched nothing",
                style("Warning:").yellow(),
                pruned.unmatched_patterns.len()
            );
        }
    }
    if let Some(tree) = &report.substitution.tree {
        println!("  substituted {} tree files", tree.modified.len());
    }
    if let Some(patches) = &report.substitution.patches {
        println!("  substituted {} patches", patches.modified.len());
    }

    println!(
        "{} Buildspace tree ready at {}",
        style("Success:").green().bold(),
        args.tree.display()
    );
    Ok(0)
}
