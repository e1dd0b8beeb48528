//! Archives a bundle asks for, resolved against a downloads directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::bundle::ConfigBundle;
use crate::downloader::ExpectedHash;
use crate::error::{Result, RetrievalError};
use crate::util::is_safe_relative_path;

/// Target name of the main source archive
pub const MAIN_SOURCE_NAME: &str = "source";

/// One archive to download, verify and extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalTarget {
    pub name: String,
    pub url: String,
    pub hash: ExpectedHash,
    /// Location of the archive inside the downloads directory
    pub download_path: PathBuf,
    /// Tree-relative extraction directory; empty for the main source
    pub output_path: PathBuf,
    pub strip_leading_dirs: usize,
}

impl RetrievalTarget {
    /// Build a target from raw strings, deriving the file name from the URL
    /// unless `download_name` is given
    pub fn new(
        name: &str,
        url: &str,
        hash: &str,
        downloads: &Path,
        download_name: Option<&str>,
        output_path: &Path,
        strip_leading_dirs: usize,
    ) -> Result<Self> {
        let hash = hash.parse().map_err(|e| RetrievalError::InvalidHash {
            target: name.to_string(),
            source: e,
        })?;
        Self::resolve(name, url, hash, downloads, download_name, output_path, strip_leading_dirs)
    }

    fn resolve(
        name: &str,
        url: &str,
        hash: ExpectedHash,
        downloads: &Path,
        download_name: Option<&str>,
        output_path: &Path,
        strip_leading_dirs: usize,
    ) -> Result<Self> {
        let invalid = |reason: String| RetrievalError::InvalidTarget {
            target: name.to_string(),
            reason,
        };

        let file_name = match download_name {
            Some(file_name) => file_name.to_string(),
            None => file_name_from_url(url).map_err(invalid)?,
        };
        if !is_plain_file_name(&file_name) {
            return Err(invalid(format!("'{}' is not a plain file name", file_name)));
        }

        if !output_path.as_os_str().is_empty() && !is_safe_relative_path(output_path) {
            return Err(invalid(format!(
                "output path '{}' must be relative and stay inside the tree",
                output_path.display()
            )));
        }

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            hash,
            download_path: downloads.join(file_name),
            output_path: output_path.to_path_buf(),
            strip_leading_dirs,
        })
    }

    pub fn is_main_source(&self) -> bool {
        self.output_path.as_os_str().is_empty()
    }
}

fn file_name_from_url(url: &str) -> std::result::Result<String, String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("invalid url '{}': {}", url, e))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .ok_or_else(|| format!("cannot derive a file name from '{}'; set download_name", url))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// Targets of a resolved bundle: the main source first, then extra
/// dependencies in merged order
pub fn retrieval_targets(bundle: &ConfigBundle, downloads: &Path) -> Result<Vec<RetrievalTarget>> {
    let source = bundle.source();
    let missing = |field: &str| RetrievalError::InvalidTarget {
        target: MAIN_SOURCE_NAME.to_string(),
        reason: format!("bundle {} sets no source {}", bundle.name(), field),
    };

    let url = source.url.as_deref().ok_or_else(|| missing("url"))?;
    let hash = source.hash.clone().ok_or_else(|| missing("hash"))?;

    let mut targets = vec![RetrievalTarget::resolve(
        MAIN_SOURCE_NAME,
        url,
        hash,
        downloads,
        source.download_name.as_deref(),
        Path::new(""),
        source.strip_leading_dirs.unwrap_or(0),
    )?];

    for (name, dep) in bundle.extra_deps() {
        if name == MAIN_SOURCE_NAME {
            return Err(RetrievalError::InvalidTarget {
                target: name.clone(),
                reason: format!("'{}' is reserved for the main source", MAIN_SOURCE_NAME),
            });
        }
        if !is_safe_relative_path(&dep.output_path) {
            return Err(RetrievalError::InvalidTarget {
                target: name.clone(),
                reason: format!(
                    "output path '{}' must be relative and stay inside the tree",
                    dep.output_path.display()
                ),
            });
        }
        targets.push(RetrievalTarget::resolve(
            name,
            &dep.url,
            dep.hash.clone(),
            downloads,
            dep.download_name.as_deref(),
            &dep.output_path,
            dep.strip_leading_dirs,
        )?);
    }

    let mut seen = HashSet::new();
    for target in &targets {
        if !seen.insert(&target.download_path) {
            return Err(RetrievalError::InvalidTarget {
                target: target.name.clone(),
                reason: format!(
                    "download file {} is shared with another target",
                    target.download_path.display()
                ),
            });
        }
    }

    Ok(targets)
}
