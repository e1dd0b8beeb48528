mod bundle_args;
mod bunnfo;
mod config;
mod genbun;
mod getsrc;
mod prubin;
mod revdom;
mod subdom;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "buildkit")]
#[command(version)]
#[command(about = "Assemble customized source trees from layered config bundles")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides it
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Resources directory holding config_bundles/ and patches/
    #[arg(long, value_name = "DIR", global = true)]
    resources: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show information about base bundles
    Bunnfo(bunnfo::BunnfoArgs),

    /// Generate a user bundle from a base bundle
    Genbun(genbun::GenbunArgs),

    /// Download, verify and extract the sources into the buildspace tree
    Getsrc(getsrc::GetsrcArgs),

    /// Prune binaries from the buildspace tree
    Prubin(prubin::PrubinArgs),

    /// Apply domain substitution to the tree and/or the patches
    Subdom(subdom::SubdomArgs),

    /// Revert domain substitution using the substitution records
    Revdom(revdom::RevdomArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = config::load(args.resources.as_deref())?;

    match args.command {
        Commands::Bunnfo(bunnfo_args) => bunnfo::execute(bunnfo_args, &config),
        Commands::Genbun(genbun_args) => genbun::execute(genbun_args, &config),
        Commands::Getsrc(getsrc_args) => {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))?;
            rt.block_on(getsrc::execute(getsrc_args, config))
        }
        Commands::Prubin(prubin_args) => prubin::execute(prubin_args, &config),
        Commands::Subdom(subdom_args) => subdom::execute(subdom_args, &config),
        Commands::Revdom(revdom_args) => revdom::execute(revdom_args, &config),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
