//! Removal of prebuilt binaries from a source tree.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, RetrievalError};
use crate::util::to_slash_path;

/// Outcome of a pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Tree-relative paths that were removed, in walk order
    pub removed: Vec<String>,
    /// Patterns that matched nothing
    pub unmatched_patterns: Vec<String>,
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| RetrievalError::PrunePattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RetrievalError::PrunePattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

/// Delete every path under `tree` matching one of `patterns`.
///
/// Patterns are globs over tree-relative `/`-separated paths, and `*` also
/// crosses `/`. Matching directories are removed with their contents and
/// symlinks are removed as links. Patterns that match nothing are logged and
/// reported, never an error.
pub fn prune_binaries<I, S>(tree: &Path, patterns: I) -> Result<PruneReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if !tree.is_dir() {
        return Err(RetrievalError::TreeMissing {
            path: tree.to_path_buf(),
        });
    }

    let patterns: Vec<String> = patterns
        .into_iter()
        .map(|p| p.as_ref().trim_start_matches("./").to_string())
        .filter(|p| !p.is_empty())
        .collect();
    let pattern_refs: Vec<&str> = patterns.iter().map(String::as_str).collect();
    let globset = build_globset(&pattern_refs)?;

    let mut matched = vec![false; patterns.len()];
    let mut report = PruneReport::default();

    let mut walker = WalkDir::new(tree)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(tree).to_path_buf();
            RetrievalError::Prune {
                path,
                source: e.into(),
            }
        })?;

        let relative = match entry.path().strip_prefix(tree) {
            Ok(relative) => to_slash_path(relative),
            Err(_) => continue,
        };

        let hits = globset.matches(&relative);
        if hits.is_empty() {
            continue;
        }
        for index in hits {
            matched[index] = true;
        }

        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir_all(path).map_err(|e| RetrievalError::Prune {
                path: path.to_path_buf(),
                source: e,
            })?;
            walker.skip_current_dir();
        } else {
            fs::remove_file(path).map_err(|e| RetrievalError::Prune {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        debug!("Pruned {}", relative);
        report.removed.push(relative);
    }

    for (pattern, hit) in patterns.into_iter().zip(matched) {
        if !hit {
            warn!("Pruning pattern matched nothing: {}", pattern);
            report.unmatched_patterns.push(pattern);
        }
    }

    Ok(report)
}
