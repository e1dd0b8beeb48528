//! Utility functions shared by bundle loading and tree rewriting.

use std::fs;
use std::io;
use std::path::{Component, Path};

/// Check that a bundle name is usable as a single directory name.
///
/// # Examples
///
/// ```
/// use buildkit::util::validate_bundle_name;
///
/// assert!(validate_bundle_name("linux_portable").is_ok());
/// assert!(validate_bundle_name("common-1.0").is_ok());
///
/// assert!(validate_bundle_name("").is_err());
/// assert!(validate_bundle_name("..").is_err());
/// assert!(validate_bundle_name("linux/portable").is_err());
/// ```
pub fn validate_bundle_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("bundle name is empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a bundle name", name));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
    {
        return Err(format!("invalid character '{}' in bundle name '{}'", c, name));
    }
    Ok(())
}

/// Check that a path stays below whatever directory it is joined onto:
/// relative, non-empty, and free of `..`.
///
/// # Examples
///
/// ```
/// use buildkit::util::is_safe_relative_path;
/// use std::path::Path;
///
/// assert!(is_safe_relative_path(Path::new("third_party/node/linux")));
/// assert!(!is_safe_relative_path(Path::new("../escape")));
/// assert!(!is_safe_relative_path(Path::new("/etc/passwd")));
/// assert!(!is_safe_relative_path(Path::new("")));
/// ```
pub fn is_safe_relative_path(path: &Path) -> bool {
    let mut has_normal = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    has_normal
}

/// Check that `path` stays below `root` once the symlinks along its
/// existing part are resolved. `root` must already be canonical.
///
/// The not-yet-created tail of `path` is ignored; a dangling symlink along
/// the existing part is an error.
pub fn resolves_within(root: &Path, path: &Path) -> io::Result<bool> {
    let mut existing = path;
    while fs::symlink_metadata(existing).is_err() {
        existing = match existing.parent() {
            Some(parent) => parent,
            None => return Ok(false),
        };
    }
    Ok(existing.canonicalize()?.starts_with(root))
}

/// Render a relative path with `/` separators, as list files write them
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
