//! Config artifacts carried by a bundle and the rules for layering them.
//!
//! List artifacts merge as an ordered, de-duplicated union; key/value
//! artifacts merge with the later bundle overriding earlier ones per key.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::downloader::ExpectedHash;
use crate::error::BundleError;

pub const SOURCE_FILE: &str = "source.toml";
pub const EXTRA_DEPS_FILE: &str = "extra_deps.toml";
pub const GN_FLAGS_FILE: &str = "gn_flags.map";
pub const PATCH_ORDER_FILE: &str = "patch_order.list";
pub const PRUNING_FILE: &str = "pruning.list";
pub const DOMAIN_REGEX_FILE: &str = "domain_regex.list";
pub const DOMAIN_SUBSTITUTION_FILE: &str = "domain_substitution.list";

/// A `pattern#replacement` line of `domain_regex.list`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubstitutionRule {
    pub pattern: String,
    pub replacement: String,
}

impl SubstitutionRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    fn parse_line(line: &str) -> Option<Self> {
        let (pattern, replacement) = line.split_once('#')?;
        if pattern.is_empty() {
            return None;
        }
        Some(Self::new(pattern, replacement))
    }

    fn to_line(&self) -> String {
        format!("{}#{}", self.pattern, self.replacement)
    }
}

/// Descriptor of the main source archive. Every field is optional so that a
/// derived bundle can override only, say, the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ExpectedHash>,

    /// File name inside the downloads directory; defaults to the URL's last segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_leading_dirs: Option<usize>,
}

impl SourceDescriptor {
    pub fn is_empty(&self) -> bool {
        *self == SourceDescriptor::default()
    }

    fn merge(&mut self, other: &SourceDescriptor) {
        if other.url.is_some() {
            self.url = other.url.clone();
        }
        if other.hash.is_some() {
            self.hash = other.hash.clone();
        }
        if other.download_name.is_some() {
            self.download_name = other.download_name.clone();
        }
        if other.strip_leading_dirs.is_some() {
            self.strip_leading_dirs = other.strip_leading_dirs;
        }
    }
}

/// An additional archive unpacked into a subdirectory of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDependency {
    pub url: String,
    pub hash: ExpectedHash,
    /// Tree-relative directory the archive is unpacked into
    pub output_path: PathBuf,
    #[serde(default)]
    pub strip_leading_dirs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_name: Option<String>,
}

/// Every config artifact of one bundle, or the merged view of a chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleArtifacts {
    pub source: SourceDescriptor,
    pub extra_deps: IndexMap<String, ExtraDependency>,
    pub gn_flags: IndexMap<String, String>,
    pub patches: IndexSet<String>,
    pub pruning: IndexSet<String>,
    pub domain_regex: IndexSet<SubstitutionRule>,
    pub domain_substitution: IndexSet<String>,
}

impl BundleArtifacts {
    /// Load the artifacts of a bundle directory; absent files are empty
    pub fn load(dir: &Path) -> Result<Self, BundleError> {
        let source = match read_optional(&dir.join(SOURCE_FILE))? {
            Some(content) => toml::from_str(&content)
                .map_err(|e| BundleError::parse(dir.join(SOURCE_FILE), e))?,
            None => SourceDescriptor::default(),
        };

        let extra_deps = match read_optional(&dir.join(EXTRA_DEPS_FILE))? {
            Some(content) => toml::from_str(&content)
                .map_err(|e| BundleError::parse(dir.join(EXTRA_DEPS_FILE), e))?,
            None => IndexMap::new(),
        };

        let mut gn_flags = IndexMap::new();
        for (number, line) in read_lines(&dir.join(GN_FLAGS_FILE), true)? {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                BundleError::parse(
                    dir.join(GN_FLAGS_FILE),
                    format!("line {}: expected key=value", number),
                )
            })?;
            gn_flags.insert(key.trim().to_string(), value.trim().to_string());
        }

        let mut domain_regex = IndexSet::new();
        for (number, line) in read_lines(&dir.join(DOMAIN_REGEX_FILE), false)? {
            let rule = SubstitutionRule::parse_line(&line).ok_or_else(|| {
                BundleError::parse(
                    dir.join(DOMAIN_REGEX_FILE),
                    format!("line {}: expected pattern#replacement", number),
                )
            })?;
            domain_regex.insert(rule);
        }

        Ok(Self {
            source,
            extra_deps,
            gn_flags,
            patches: read_list(&dir.join(PATCH_ORDER_FILE))?,
            pruning: read_list(&dir.join(PRUNING_FILE))?,
            domain_regex,
            domain_substitution: read_list(&dir.join(DOMAIN_SUBSTITUTION_FILE))?,
        })
    }

    /// Write every artifact file into `dir`
    pub fn write(&self, dir: &Path) -> Result<(), BundleError> {
        let source = toml::to_string(&self.source)
            .map_err(|e| BundleError::parse(dir.join(SOURCE_FILE), e))?;
        write_file(&dir.join(SOURCE_FILE), &source)?;

        let extra_deps = toml::to_string(&self.extra_deps)
            .map_err(|e| BundleError::parse(dir.join(EXTRA_DEPS_FILE), e))?;
        write_file(&dir.join(EXTRA_DEPS_FILE), &extra_deps)?;

        let gn_flags = self.gn_flags.iter().map(|(k, v)| format!("{}={}", k, v));
        write_file(&dir.join(GN_FLAGS_FILE), &join_lines(gn_flags))?;

        write_file(&dir.join(PATCH_ORDER_FILE), &join_lines(self.patches.iter().cloned()))?;
        write_file(&dir.join(PRUNING_FILE), &join_lines(self.pruning.iter().cloned()))?;
        write_file(
            &dir.join(DOMAIN_REGEX_FILE),
            &join_lines(self.domain_regex.iter().map(SubstitutionRule::to_line)),
        )?;
        write_file(
            &dir.join(DOMAIN_SUBSTITUTION_FILE),
            &join_lines(self.domain_substitution.iter().cloned()),
        )?;

        Ok(())
    }

    /// Layer `other` (a bundle later in dependency order) on top of `self`
    pub fn merge(&mut self, other: &BundleArtifacts) {
        self.source.merge(&other.source);

        for (name, dep) in &other.extra_deps {
            self.extra_deps.insert(name.clone(), dep.clone());
        }
        for (key, value) in &other.gn_flags {
            self.gn_flags.insert(key.clone(), value.clone());
        }

        self.patches.extend(other.patches.iter().cloned());
        self.pruning.extend(other.pruning.iter().cloned());
        self.domain_regex.extend(other.domain_regex.iter().cloned());
        self.domain_substitution
            .extend(other.domain_substitution.iter().cloned());
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, BundleError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BundleError::io(path, e)),
    }
}

/// Non-blank lines with their 1-based line numbers
fn read_lines(path: &Path, allow_comments: bool) -> Result<Vec<(usize, String)>, BundleError> {
    let content = match read_optional(path)? {
        Some(content) => content,
        None => return Ok(Vec::new()),
    };

    Ok(content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .filter(|(_, line)| !(allow_comments && line.starts_with('#')))
        .map(|(number, line)| (number, line.to_string()))
        .collect())
}

fn read_list(path: &Path) -> Result<IndexSet<String>, BundleError> {
    Ok(read_lines(path, true)?
        .into_iter()
        .map(|(_, line)| line.trim().to_string())
        .collect())
}

fn join_lines(lines: impl Iterator<Item = String>) -> String {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }
    content
}

fn write_file(path: &Path, content: &str) -> Result<(), BundleError> {
    fs::write(path, content).map_err(|e| BundleError::io(path, e))
}
