//! Download, verify, extract, prune and substitute a bundle's sources.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use futures_util::{stream, StreamExt, TryStreamExt};
use log::{debug, info, warn};

use super::target::{retrieval_targets, RetrievalTarget};
use crate::bundle::ConfigBundle;
use crate::config::DownloadConfig;
use crate::downloader::{ArchiveExtractor, DownloadObserver, DownloadOutcome, ExtractionReport, FileDownloader};
use crate::error::{Result, RetrievalError};
use crate::http::{HttpClient, HttpClientConfig, HttpError};
use crate::progress::ProgressManager;
use crate::tree::{
    prune_binaries, substitute_patches, substitute_tree, DomainSubstituter, PruneReport,
    SubstitutionScope, SubstitutionSummary,
};

/// Knobs of one retrieval run
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub prune_binaries: bool,
    pub show_progress: bool,
    /// `None` disables domain substitution
    pub substitution: Option<SubstitutionScope>,
    /// Maximum number of concurrent downloads
    pub concurrency: usize,
    pub http: HttpClientConfig,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default())
    }
}

impl RetrievalOptions {
    /// Defaults with the download settings of a loaded configuration
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            prune_binaries: true,
            show_progress: true,
            substitution: Some(SubstitutionScope::Both),
            concurrency: config.concurrency.max(1),
            http: config.http_client_config(),
        }
    }
}

/// What happened to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    pub download: DownloadOutcome,
    pub extraction: ExtractionReport,
}

/// Outcome of a successful retrieval run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalReport {
    /// Per-target results, in target order
    pub targets: Vec<TargetReport>,
    pub pruned: Option<PruneReport>,
    pub substitution: SubstitutionSummary,
}

/// Drives downloads and tree assembly for a bundle
pub struct SourceRetriever {
    downloader: FileDownloader,
    observer: Arc<dyn DownloadObserver>,
}

impl SourceRetriever {
    pub fn new(http_client: Arc<HttpClient>, observer: Arc<dyn DownloadObserver>) -> Self {
        Self {
            downloader: FileDownloader::new(http_client),
            observer,
        }
    }

    /// Build a retriever reporting to an indicatif progress manager
    pub fn from_options(options: &RetrievalOptions) -> Result<Self> {
        let client = HttpClient::with_config(options.http.clone()).map_err(|e| RetrievalError::Download {
            target: "http client".to_string(),
            source: HttpError::Request(e),
        })?;
        let progress: Arc<dyn DownloadObserver> = Arc::new(ProgressManager::new(options.show_progress));
        Ok(Self::new(Arc::new(client), progress))
    }

    /// Fetch every target, at most `concurrency` at a time.
    ///
    /// The first failure cancels the downloads still in flight; their
    /// temporary files are dropped with them. Outcomes are in target order.
    pub async fn download_all(
        &self,
        targets: &[RetrievalTarget],
        concurrency: usize,
    ) -> Result<Vec<DownloadOutcome>> {
        let observer = self.observer.as_ref();
        let mut outcomes: HashMap<String, DownloadOutcome> = stream::iter(targets)
            .map(|target| async move {
                debug!("Retrieving {} from {}", target.name, target.url);
                let outcome = self
                    .downloader
                    .fetch_verified(&target.name, &target.url, &target.download_path, &target.hash, observer)
                    .await?;
                Ok::<_, RetrievalError>((target.name.clone(), outcome))
            })
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await?;

        Ok(targets
            .iter()
            .filter_map(|target| outcomes.remove(&target.name))
            .collect())
    }

    /// Run the whole pipeline for `bundle`.
    ///
    /// The tree is assembled in a staging directory beside `tree` and renamed
    /// into place only once extraction, pruning and tree substitution have
    /// succeeded, so a failed run leaves no `tree` behind. Patches are
    /// substituted after the rename.
    pub async fn retrieve_and_extract(
        &self,
        bundle: &ConfigBundle,
        downloads: &Path,
        tree: &Path,
        options: &RetrievalOptions,
    ) -> Result<RetrievalReport> {
        check_preconditions(downloads, tree)?;
        let substitution = check_substitution(bundle, options.substitution)?;

        let targets = retrieval_targets(bundle, downloads)?;
        info!("Downloading {} archives into {}", targets.len(), downloads.display());
        let outcomes = self.download_all(&targets, options.concurrency).await?;

        let mut report = {
            let bundle = bundle.clone();
            let tree = tree.to_path_buf();
            let prune = options.prune_binaries;
            tokio::task::spawn_blocking(move || {
                assemble_tree(&bundle, &targets, outcomes, &tree, prune, substitution)
            })
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))??
        };

        if let Some(scope) = substitution.filter(|scope| scope.includes_patches()) {
            report.substitution.patches = substitute_patches(bundle, scope)?;
        }

        info!("Buildspace tree ready at {}", tree.display());
        Ok(report)
    }
}

fn check_preconditions(downloads: &Path, tree: &Path) -> Result<()> {
    match fs::metadata(downloads) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(RetrievalError::NotADirectory {
                path: downloads.to_path_buf(),
            })
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RetrievalError::DownloadsDirMissing {
                path: downloads.to_path_buf(),
            })
        }
        Err(e) => return Err(RetrievalError::io(downloads, e)),
    }

    if fs::symlink_metadata(tree).is_ok() {
        return Err(RetrievalError::TreeAlreadyExists {
            path: tree.to_path_buf(),
        });
    }
    Ok(())
}

/// Validate rules and the read-only policy before any network traffic
fn check_substitution(
    bundle: &ConfigBundle,
    scope: Option<SubstitutionScope>,
) -> Result<Option<SubstitutionScope>> {
    let scope = match scope {
        Some(scope) => scope,
        None => return Ok(None),
    };

    DomainSubstituter::new(bundle.domain_regex())?;

    if !bundle.is_user_bundle() && scope.includes_patches() {
        if scope == SubstitutionScope::Patches {
            return Err(RetrievalError::BundleReadOnly {
                name: bundle.name().to_string(),
            });
        }
        warn!(
            "Bundle {} is a base bundle; its patches will not be substituted",
            bundle.name()
        );
        return Ok(Some(SubstitutionScope::Tree));
    }

    Ok(Some(scope))
}

/// Extract, prune and substitute into a staging directory, then move it to `tree`.
/// Blocking; runs on the blocking thread pool.
fn assemble_tree(
    bundle: &ConfigBundle,
    targets: &[RetrievalTarget],
    outcomes: Vec<DownloadOutcome>,
    tree: &Path,
    prune: bool,
    substitution: Option<SubstitutionScope>,
) -> Result<RetrievalReport> {
    let parent = match tree.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| RetrievalError::io(parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".tree-")
        .tempdir_in(parent)
        .map_err(|e| RetrievalError::io(parent, e))?;

    let mut report = RetrievalReport::default();
    for (target, download) in targets.iter().zip(outcomes) {
        info!(
            "Extracting {} into {}",
            target.name,
            staging.path().join(&target.output_path).display()
        );
        let extraction = ArchiveExtractor::unpack_below(
            &target.download_path,
            staging.path(),
            &target.output_path,
            target.strip_leading_dirs,
        )?;
        debug!(
            "{}: {} files, {} directories, {} links",
            target.name, extraction.files, extraction.directories, extraction.links
        );
        report.targets.push(TargetReport {
            name: target.name.clone(),
            download,
            extraction,
        });
    }

    if prune {
        info!("Pruning binaries");
        report.pruned = Some(prune_binaries(staging.path(), bundle.pruning())?);
    }

    if substitution.is_some_and(|scope| scope.includes_tree()) {
        info!("Applying domain substitution to the tree");
        report.substitution.tree = Some(substitute_tree(bundle, staging.path())?);
    }

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, tree) {
        let _ = fs::remove_dir_all(&staged);
        return Err(RetrievalError::io(tree, e));
    }

    Ok(report)
}

/// Retrieve a bundle's sources into `tree` with a retriever built from `options`
pub async fn retrieve_and_extract(
    bundle: &ConfigBundle,
    downloads: &Path,
    tree: &Path,
    options: &RetrievalOptions,
) -> Result<RetrievalReport> {
    SourceRetriever::from_options(options)?
        .retrieve_and_extract(bundle, downloads, tree, options)
        .await
}
