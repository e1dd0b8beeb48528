//! Rewriting of the buildspace tree: binary pruning and domain substitution.
//!
//! The functions here apply a resolved bundle's rules; [`prune_binaries`] and
//! [`DomainSubstituter`] are the bundle-agnostic building blocks.

mod prune;
mod substitution;

use std::path::Path;

use log::{info, warn};

use crate::bundle::ConfigBundle;
use crate::error::{Result, RetrievalError};

pub use prune::{prune_binaries, PruneReport};
pub use substitution::{
    revert, DomainSubstituter, SubstitutionError, SubstitutionReport, SubstitutionScope,
    SUBSTITUTION_RECORD,
};

/// Per-scope results of [`substitute_domains`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionSummary {
    pub tree: Option<SubstitutionReport>,
    pub patches: Option<SubstitutionReport>,
}

/// Per-scope results of [`revert_domains`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertSummary {
    pub tree: Option<Vec<String>>,
    pub patches: Option<Vec<String>>,
}

/// Prune `tree` with the bundle's merged pruning list
pub fn prune_tree(bundle: &ConfigBundle, tree: &Path) -> Result<PruneReport> {
    info!("Pruning binaries from {}", tree.display());
    let report = prune_binaries(tree, bundle.pruning())?;
    info!("Pruned {} paths", report.removed.len());
    Ok(report)
}

/// Substitute the files of `tree` selected by the bundle's substitution list
pub fn substitute_tree(bundle: &ConfigBundle, tree: &Path) -> Result<SubstitutionReport> {
    if !tree.is_dir() {
        return Err(RetrievalError::TreeMissing {
            path: tree.to_path_buf(),
        });
    }

    let substituter = DomainSubstituter::new(bundle.domain_regex())?;
    let record = tree.join(SUBSTITUTION_RECORD);
    Ok(substituter.apply(tree, bundle.domain_substitution(), &record)?)
}

/// Substitute the patches of a user bundle, honoring the base-bundle policy:
/// under [`SubstitutionScope::Both`] a base bundle's patches are skipped with
/// a warning, under [`SubstitutionScope::Patches`] it is an error.
pub fn substitute_patches(
    bundle: &ConfigBundle,
    scope: SubstitutionScope,
) -> Result<Option<SubstitutionReport>> {
    let record = match patches_record(bundle, scope)? {
        Some(record) => record,
        None => return Ok(None),
    };

    let substituter = DomainSubstituter::new(bundle.domain_regex())?;
    Ok(Some(substituter.apply(&bundle.patches_dir(), bundle.patches(), &record)?))
}

/// Apply domain substitution to the scopes selected by `scope`
pub fn substitute_domains(
    bundle: &ConfigBundle,
    tree: &Path,
    scope: SubstitutionScope,
) -> Result<SubstitutionSummary> {
    // validate the rules before touching either scope
    DomainSubstituter::new(bundle.domain_regex())?;

    let mut summary = SubstitutionSummary::default();
    if scope.includes_tree() {
        summary.tree = Some(substitute_tree(bundle, tree)?);
    }
    if scope.includes_patches() {
        summary.patches = substitute_patches(bundle, scope)?;
    }
    Ok(summary)
}

/// Undo domain substitution using the records of the selected scopes.
///
/// A missing record is an error when a single scope is requested and a
/// warning under [`SubstitutionScope::Both`].
pub fn revert_domains(
    bundle: &ConfigBundle,
    tree: &Path,
    scope: SubstitutionScope,
) -> Result<RevertSummary> {
    let mut summary = RevertSummary::default();

    if scope.includes_tree() {
        if !tree.is_dir() {
            return Err(RetrievalError::TreeMissing {
                path: tree.to_path_buf(),
            });
        }
        summary.tree = revert_scope(tree, &tree.join(SUBSTITUTION_RECORD), scope)?;
    }

    if scope.includes_patches() {
        if let Some(record) = patches_record(bundle, scope)? {
            summary.patches = revert_scope(&bundle.patches_dir(), &record, scope)?;
        }
    }

    Ok(summary)
}

fn revert_scope(
    root: &Path,
    record: &Path,
    scope: SubstitutionScope,
) -> Result<Option<Vec<String>>> {
    match revert(root, record) {
        Ok(restored) => Ok(Some(restored)),
        Err(SubstitutionError::RecordMissing { path }) if scope == SubstitutionScope::Both => {
            warn!("Nothing to revert: no substitution record at {}", path.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn patches_record(
    bundle: &ConfigBundle,
    scope: SubstitutionScope,
) -> Result<Option<std::path::PathBuf>> {
    match bundle.substitution_record_path() {
        Some(record) => Ok(Some(record)),
        None if scope == SubstitutionScope::Patches => Err(RetrievalError::BundleReadOnly {
            name: bundle.name().to_string(),
        }),
        None => {
            warn!(
                "Skipping patches of base bundle {}: base bundles are read-only",
                bundle.name()
            );
            Ok(None)
        }
    }
}
