//! Config bundle resolution and source retrieval for customized builds of a
//! large upstream codebase.
//!
//! Named config bundles layer on top of each other through a single `base`
//! chain ([`ConfigBundle`]). A resolved bundle drives the retrieval pipeline
//! ([`retrieve_and_extract`]), which downloads and verifies archives,
//! extracts them into a buildspace tree, prunes prebuilt binaries and
//! rewrites domain strings.

pub mod bundle;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod progress;
pub mod retrieval;
pub mod tree;
pub mod util;

pub use bundle::{list_dependency_order, BundleKind, BundleStore, ConfigBundle};
pub use config::{Config, DownloadConfig};
pub use error::{BundleError, ConfigError, GenerateError, Result, RetrievalError};
pub use retrieval::{retrieve_and_extract, RetrievalOptions, RetrievalReport, RetrievalTarget, SourceRetriever};
pub use tree::{
    prune_binaries, prune_tree, revert_domains, substitute_domains, SubstitutionError,
    SubstitutionScope,
};
