//! Runtime configuration for buildkit
//!
//! Configuration is read from `buildkit.toml` files and `BUILDKIT_*`
//! environment variables, then merged in priority order.
//!
//! # Configuration Sources (in priority order, highest to lowest)
//!
//! 1. Command line flags (applied by the caller)
//! 2. Environment variables (`BUILDKIT_RESOURCES`, `BUILDKIT_DOWNLOAD_CONCURRENCY`)
//! 3. The nearest `buildkit.toml` above the working directory
//! 4. `buildkit.toml` in the user config directory (`BUILDKIT_HOME` overrides it)
//! 5. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! resources_dir = "~/src/ungoogled/resources"
//!
//! [download]
//! concurrency = 8
//! read_timeout_secs = 120
//! proxy = "http://proxy.example.com:3128"
//! ```
//!
//! ```rust,no_run
//! use buildkit::config::Config;
//! use std::path::Path;
//!
//! let config = Config::build(Some(Path::new(".")), true).unwrap();
//! println!("Resources: {:?}", config.get_resources_dir());
//! println!("Parallel downloads: {}", config.download.concurrency);
//! ```

#[allow(clippy::module_inception)]
mod config;
mod source;

pub use config::{Config, DownloadConfig};
pub use source::{ConfigLoader, ConfigSource, RawConfig, RawDownloadConfig, CONFIG_FILE};
