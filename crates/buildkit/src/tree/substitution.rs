//! Domain substitution: regex rewriting of selected files with a record of
//! every pre-image so the rewrite can be reverted.
//!
//! The record is a gzip-compressed tar archive whose entries are the original
//! contents of every modified file, named by their path relative to the
//! substitution root.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use regex::bytes::Regex;
use thiserror::Error;

use crate::bundle::SubstitutionRule;
use crate::util::{is_safe_relative_path, resolves_within, to_slash_path};

/// File name of the substitution record at a substitution root
pub const SUBSTITUTION_RECORD: &str = "domsubcache.tar.gz";

#[derive(Error, Debug)]
pub enum SubstitutionError {
    #[error("Invalid substitution pattern {pattern}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Rule {pattern}#{replacement} is not idempotent: its replacement matches pattern {matched_by}")]
    NonIdempotentRule {
        pattern: String,
        replacement: String,
        matched_by: String,
    },

    #[error("Substituting {} is not idempotent: a second pass changes it again", path.display())]
    NonIdempotentOutput { path: PathBuf },

    #[error("{} was already substituted and would change again; revert it first", path.display())]
    AlreadySubstituted { path: PathBuf },

    #[error("Substitution path leaves its root: {path}")]
    UnsafePath { path: String },

    #[error("No substitution record at {}", path.display())]
    RecordMissing { path: PathBuf },

    #[error("Corrupt substitution record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SubstitutionError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SubstitutionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which part of the buildspace a substitution applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionScope {
    /// Files of the source tree selected by `domain_substitution.list`
    Tree,
    /// The patches listed in `patch_order.list`
    Patches,
    Both,
}

impl SubstitutionScope {
    pub fn includes_tree(self) -> bool {
        matches!(self, SubstitutionScope::Tree | SubstitutionScope::Both)
    }

    pub fn includes_patches(self) -> bool {
        matches!(self, SubstitutionScope::Patches | SubstitutionScope::Both)
    }
}

impl FromStr for SubstitutionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tree" => Ok(SubstitutionScope::Tree),
            "patches" => Ok(SubstitutionScope::Patches),
            "both" => Ok(SubstitutionScope::Both),
            other => Err(format!("unknown substitution scope '{}'", other)),
        }
    }
}

impl fmt::Display for SubstitutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstitutionScope::Tree => write!(f, "tree"),
            SubstitutionScope::Patches => write!(f, "patches"),
            SubstitutionScope::Both => write!(f, "both"),
        }
    }
}

/// Outcome of one substitution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// Files rewritten by this run
    pub modified: Vec<String>,
    /// Files that contained no match
    pub unchanged: usize,
    /// Files skipped because they look binary
    pub binary: Vec<String>,
    /// Selected files that do not exist
    pub missing: Vec<String>,
    /// Selected files that are symlinks and were left alone
    pub links: Vec<String>,
}

struct CompiledRule {
    regex: Regex,
    template: String,
}

/// Applies an ordered set of `pattern#replacement` rules to files.
///
/// Replacements may refer to capture groups as `\1` or `\g<name>`; every
/// other character is literal.
pub struct DomainSubstituter {
    rules: Vec<CompiledRule>,
}

impl DomainSubstituter {
    /// Compile the rules, rejecting any rule whose literal replacement text
    /// would itself be matched by one of the patterns.
    ///
    /// Only the literal part of a replacement is checked here. Text produced
    /// by capture groups is checked per file by [`apply`](Self::apply).
    pub fn new<'a, I>(rules: I) -> Result<Self, SubstitutionError>
    where
        I: IntoIterator<Item = &'a SubstitutionRule>,
    {
        let rules: Vec<&SubstitutionRule> = rules.into_iter().collect();

        let mut compiled = Vec::with_capacity(rules.len());
        let mut literals = Vec::with_capacity(rules.len());
        for rule in &rules {
            let regex = Regex::new(&rule.pattern).map_err(|e| SubstitutionError::InvalidRegex {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            })?;
            let (template, literal) = translate_replacement(&rule.replacement);
            compiled.push(CompiledRule { regex, template });
            literals.push(literal);
        }

        for (rule, literal) in rules.iter().zip(&literals) {
            if literal.is_empty() {
                continue;
            }
            if let Some((other, _)) = rules
                .iter()
                .zip(&compiled)
                .find(|(_, c)| c.regex.is_match(literal.as_bytes()))
            {
                return Err(SubstitutionError::NonIdempotentRule {
                    pattern: rule.pattern.clone(),
                    replacement: rule.replacement.clone(),
                    matched_by: other.pattern.clone(),
                });
            }
        }

        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order; `None` when nothing changed
    pub fn substitute(&self, content: &[u8]) -> Option<Vec<u8>> {
        let mut current: Option<Vec<u8>> = None;
        for rule in &self.rules {
            let input = current.as_deref().unwrap_or(content);
            if !rule.regex.is_match(input) {
                continue;
            }
            let replaced = rule.regex.replace_all(input, rule.template.as_bytes()).into_owned();
            current = Some(replaced);
        }
        current.filter(|result| result.as_slice() != content)
    }

    /// Substitute `files` (relative to `root`), recording pre-images in `record`.
    ///
    /// The record is extended before any file is rewritten. A file that is
    /// already in the record and would change again is an error, since its
    /// recorded pre-image would no longer restore it. So is a file whose
    /// substituted content would change on a second pass. Symlinks are
    /// reported and left alone.
    pub fn apply<I, S>(&self, root: &Path, files: I, record: &Path) -> Result<SubstitutionReport, SubstitutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recorded = recorded_names(record)?;
        let mut report = SubstitutionReport::default();
        let mut changed = Vec::new();

        for file in files {
            let relative = file.as_ref();
            if !is_safe_relative_path(Path::new(relative)) {
                return Err(SubstitutionError::UnsafePath {
                    path: relative.to_string(),
                });
            }
            let name = to_slash_path(Path::new(relative));
            let path = root.join(&name);

            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("File selected for substitution does not exist: {}", path.display());
                    report.missing.push(name);
                    continue;
                }
                Err(e) => return Err(SubstitutionError::io(&path, e)),
            };
            if metadata.file_type().is_symlink() {
                warn!("Not substituting symlink {}", path.display());
                report.links.push(name);
                continue;
            }
            if !metadata.is_file() {
                warn!("File selected for substitution is not a regular file: {}", path.display());
                report.missing.push(name);
                continue;
            }
            ensure_within(root, &path, &name)?;

            let content = fs::read(&path).map_err(|e| SubstitutionError::io(&path, e))?;
            if content.contains(&0) {
                debug!("Skipping binary file {}", name);
                report.binary.push(name);
                continue;
            }

            let updated = match self.substitute(&content) {
                Some(updated) => updated,
                None => {
                    report.unchanged += 1;
                    continue;
                }
            };
            if self.substitute(&updated).is_some() {
                return Err(SubstitutionError::NonIdempotentOutput { path });
            }
            if recorded.contains(&name) {
                return Err(SubstitutionError::AlreadySubstituted { path });
            }
            changed.push(name);
        }

        if changed.is_empty() {
            info!("Domain substitution changed nothing under {}", root.display());
            return Ok(report);
        }

        extend_record(record, root, &changed)?;

        for name in changed {
            let path = root.join(&name);
            let content = fs::read(&path).map_err(|e| SubstitutionError::io(&path, e))?;
            if let Some(updated) = self.substitute(&content) {
                fs::write(&path, updated).map_err(|e| SubstitutionError::io(&path, e))?;
                debug!("Substituted {}", name);
            }
            report.modified.push(name);
        }

        info!(
            "Domain substitution modified {} files under {}",
            report.modified.len(),
            root.display()
        );
        Ok(report)
    }
}

/// Convert a `\1` / `\g<name>` style replacement into a regex crate template,
/// returning the template and the replacement's literal text
fn translate_replacement(replacement: &str) -> (String, String) {
    let mut template = String::with_capacity(replacement.len());
    let mut literal = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    template.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let group: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        template.push_str(&format!("${{{}}}", group));
                    } else {
                        template.push('g');
                        literal.push('g');
                    }
                }
                Some('\\') => {
                    chars.next();
                    template.push('\\');
                    literal.push('\\');
                }
                _ => {
                    template.push('\\');
                    literal.push('\\');
                }
            },
            '$' => {
                template.push_str("$$");
                literal.push('$');
            }
            other => {
                template.push(other);
                literal.push(other);
            }
        }
    }

    (template, literal)
}

fn open_record(record: &Path) -> Result<tar::Archive<GzDecoder<File>>, SubstitutionError> {
    let file = File::open(record).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SubstitutionError::RecordMissing {
            path: record.to_path_buf(),
        },
        _ => SubstitutionError::io(record, e),
    })?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn corrupt(record: &Path, e: impl ToString) -> SubstitutionError {
    SubstitutionError::CorruptRecord {
        path: record.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Names already present in `record`; empty when there is no record
fn recorded_names(record: &Path) -> Result<HashSet<String>, SubstitutionError> {
    if !record.exists() {
        return Ok(HashSet::new());
    }

    let mut archive = open_record(record)?;
    let mut names = HashSet::new();
    for entry in archive.entries().map_err(|e| corrupt(record, e))? {
        let entry = entry.map_err(|e| corrupt(record, e))?;
        let path = entry.path().map_err(|e| corrupt(record, e))?;
        names.insert(to_slash_path(&path));
    }
    Ok(names)
}

/// Rewrite `record` with its existing entries plus the current contents of `names`
fn extend_record(record: &Path, root: &Path, names: &[String]) -> Result<(), SubstitutionError> {
    let parent = match record.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| SubstitutionError::io(&parent, e))?;

    let temp = tempfile::Builder::new()
        .prefix(".domsubcache-")
        .suffix(".partial")
        .tempfile_in(&parent)
        .map_err(|e| SubstitutionError::io(&parent, e))?;

    let mut builder = tar::Builder::new(GzEncoder::new(temp, flate2::Compression::default()));

    if record.exists() {
        let mut archive = open_record(record)?;
        for entry in archive.entries().map_err(|e| corrupt(record, e))? {
            let mut entry = entry.map_err(|e| corrupt(record, e))?;
            let path = entry.path().map_err(|e| corrupt(record, e))?.into_owned();
            let mut header = entry.header().clone();
            builder
                .append_data(&mut header, &path, &mut entry)
                .map_err(|e| SubstitutionError::io(record, e))?;
        }
    }

    for name in names {
        let path = root.join(name);
        let content = fs::read(&path).map_err(|e| SubstitutionError::io(&path, e))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, content.as_slice())
            .map_err(|e| SubstitutionError::io(record, e))?;
    }

    let temp = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| SubstitutionError::io(record, e))?;
    temp.persist(record)
        .map_err(|e| SubstitutionError::io(record, e.error))?;

    debug!("Recorded {} pre-images in {}", names.len(), record.display());
    Ok(())
}

/// Fail unless `path` resolves below `root` through any symlinked directories
fn ensure_within(root: &Path, path: &Path, name: &str) -> Result<(), SubstitutionError> {
    let canonical_root = root.canonicalize().map_err(|e| SubstitutionError::io(root, e))?;
    let inside = resolves_within(&canonical_root, path).map_err(|e| SubstitutionError::io(path, e))?;
    if !inside {
        return Err(SubstitutionError::UnsafePath {
            path: name.to_string(),
        });
    }
    Ok(())
}

/// Restore every pre-image in `record` under `root`, then delete the record
pub fn revert(root: &Path, record: &Path) -> Result<Vec<String>, SubstitutionError> {
    let mut archive = open_record(record)?;
    let mut restored = Vec::new();

    for entry in archive.entries().map_err(|e| corrupt(record, e))? {
        let mut entry = entry.map_err(|e| corrupt(record, e))?;
        let relative = entry.path().map_err(|e| corrupt(record, e))?.into_owned();
        if !is_safe_relative_path(&relative) {
            return Err(corrupt(record, format!("unsafe entry {}", relative.display())));
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| corrupt(record, e))?;

        let name = to_slash_path(&relative);
        let path = root.join(&relative);
        if fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(SubstitutionError::UnsafePath { path: name });
        }
        if let Some(dir) = path.parent() {
            ensure_within(root, dir, &name)?;
            fs::create_dir_all(dir).map_err(|e| SubstitutionError::io(dir, e))?;
        }
        fs::write(&path, content).map_err(|e| SubstitutionError::io(&path, e))?;
        restored.push(name);
    }

    fs::remove_file(record).map_err(|e| SubstitutionError::io(record, e))?;
    info!("Reverted {} files under {}", restored.len(), root.display());
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rules(items: &[(&str, &str)]) -> Vec<SubstitutionRule> {
        items
            .iter()
            .map(|(p, r)| SubstitutionRule::new(*p, *r))
            .collect()
    }

    fn google_rules() -> Vec<SubstitutionRule> {
        rules(&[
            (r"(\w+)\.google\.com", r"\g<1>.9oo91e.qjz9zk"),
            (r"google\.com", "9oo91e.qjz9zk"),
        ])
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("tree".parse::<SubstitutionScope>().unwrap(), SubstitutionScope::Tree);
        assert_eq!("BOTH".parse::<SubstitutionScope>().unwrap(), SubstitutionScope::Both);
        assert!("none".parse::<SubstitutionScope>().is_err());
        assert!(SubstitutionScope::Both.includes_tree());
        assert!(!SubstitutionScope::Tree.includes_patches());
    }

    #[test]
    fn test_translate_replacement() {
        assert_eq!(
            translate_replacement(r"\g<1>.9oo91e"),
            ("${1}.9oo91e".to_string(), ".9oo91e".to_string())
        );
        assert_eq!(
            translate_replacement(r"\2-x$"),
            ("${2}-x$$".to_string(), "-x$".to_string())
        );
    }

    #[test]
    fn test_substitute_with_groups() {
        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();

        let out = substituter
            .substitute(b"url = https://www.google.com/ and google.com")
            .unwrap();
        assert_eq!(out, b"url = https://www.9oo91e.qjz9zk/ and 9oo91e.qjz9zk".to_vec());
        assert_eq!(substituter.substitute(&out), None);
    }

    #[test]
    fn test_non_idempotent_rule_rejected() {
        let rules = rules(&[("foo", "bar"), ("bar", "baz")]);
        match DomainSubstituter::new(&rules) {
            Err(SubstitutionError::NonIdempotentRule { pattern, matched_by, .. }) => {
                assert_eq!(pattern, "foo");
                assert_eq!(matched_by, "bar");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_invalid_regex() {
        let rules = rules(&[("(unclosed", "x")]);
        assert!(matches!(
            DomainSubstituter::new(&rules),
            Err(SubstitutionError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_apply_twice_then_revert() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("chrome")).unwrap();
        fs::write(root.join("chrome/url.cc"), "https://google.com\n").unwrap();
        fs::write(root.join("chrome/plain.cc"), "nothing here\n").unwrap();
        fs::write(root.join("chrome/blob.dat"), b"google.com\0\x01").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();
        let files = ["chrome/url.cc", "chrome/plain.cc", "chrome/blob.dat", "chrome/gone.cc"];

        let first = substituter.apply(root, files, &record).unwrap();
        assert_eq!(first.modified, vec!["chrome/url.cc"]);
        assert_eq!(first.unchanged, 1);
        assert_eq!(first.binary, vec!["chrome/blob.dat"]);
        assert_eq!(first.missing, vec!["chrome/gone.cc"]);
        assert_eq!(
            fs::read_to_string(root.join("chrome/url.cc")).unwrap(),
            "https://9oo91e.qjz9zk\n"
        );
        assert!(record.exists());

        let second = substituter.apply(root, files, &record).unwrap();
        assert!(second.modified.is_empty());

        let restored = revert(root, &record).unwrap();
        assert_eq!(restored, vec!["chrome/url.cc"]);
        assert_eq!(
            fs::read_to_string(root.join("chrome/url.cc")).unwrap(),
            "https://google.com\n"
        );
        assert!(!record.exists());
    }

    #[test]
    fn test_record_is_extended() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.cc"), "google.com").unwrap();
        fs::write(root.join("b.cc"), "google.com").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();
        substituter.apply(root, ["a.cc"], &record).unwrap();
        substituter.apply(root, ["b.cc"], &record).unwrap();

        let mut names: Vec<_> = recorded_names(&record).unwrap().into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["a.cc", "b.cc"]);

        revert(root, &record).unwrap();
        assert_eq!(fs::read_to_string(root.join("a.cc")).unwrap(), "google.com");
        assert_eq!(fs::read_to_string(root.join("b.cc")).unwrap(), "google.com");
    }

    #[test]
    fn test_recorded_file_changed_again_fails() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.cc"), "google.com").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();
        substituter.apply(root, ["a.cc"], &record).unwrap();

        fs::write(root.join("a.cc"), "google.com again").unwrap();
        assert!(matches!(
            substituter.apply(root, ["a.cc"], &record).unwrap_err(),
            SubstitutionError::AlreadySubstituted { .. }
        ));
    }

    #[test]
    fn test_unsafe_selector_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();

        assert!(matches!(
            substituter
                .apply(temp_dir.path(), ["../outside.cc"], &temp_dir.path().join(SUBSTITUTION_RECORD))
                .unwrap_err(),
            SubstitutionError::UnsafePath { .. }
        ));
    }

    #[test]
    fn test_group_expansion_checked_per_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.cc"), "ab").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        // The literal "b" never matches, but "ab" -> "aab" does
        let rules = rules(&[("(a)b", r"\1\1b")]);
        let substituter = DomainSubstituter::new(&rules).unwrap();

        assert!(matches!(
            substituter.apply(root, ["a.cc"], &record).unwrap_err(),
            SubstitutionError::NonIdempotentOutput { .. }
        ));
        assert_eq!(fs::read_to_string(root.join("a.cc")).unwrap(), "ab");
        assert!(!record.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp_dir.path();
        let victim = outside.path().join("victim.cc");
        fs::write(&victim, "google.com").unwrap();
        fs::create_dir(root.join("chrome")).unwrap();
        std::os::unix::fs::symlink(&victim, root.join("chrome/app.cc")).unwrap();
        fs::write(root.join("chrome/real.cc"), "google.com").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();
        let report = substituter
            .apply(root, ["chrome/app.cc", "chrome/real.cc"], &record)
            .unwrap();

        assert_eq!(report.links, vec!["chrome/app.cc"]);
        assert_eq!(report.modified, vec!["chrome/real.cc"]);
        assert_eq!(fs::read_to_string(&victim).unwrap(), "google.com");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(outside.path().join("app.cc"), "google.com").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("chrome")).unwrap();

        let rules = google_rules();
        let substituter = DomainSubstituter::new(&rules).unwrap();
        assert!(matches!(
            substituter
                .apply(root, ["chrome/app.cc"], &root.join(SUBSTITUTION_RECORD))
                .unwrap_err(),
            SubstitutionError::UnsafePath { .. }
        ));
        assert_eq!(
            fs::read_to_string(outside.path().join("app.cc")).unwrap(),
            "google.com"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_revert_refuses_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.cc"), "google.com").unwrap();
        let record = root.join(SUBSTITUTION_RECORD);

        let rules = google_rules();
        DomainSubstituter::new(&rules)
            .unwrap()
            .apply(root, ["a.cc"], &record)
            .unwrap();

        let victim = outside.path().join("victim.cc");
        fs::write(&victim, "keep").unwrap();
        fs::remove_file(root.join("a.cc")).unwrap();
        std::os::unix::fs::symlink(&victim, root.join("a.cc")).unwrap();

        assert!(matches!(
            revert(root, &record).unwrap_err(),
            SubstitutionError::UnsafePath { .. }
        ));
        assert_eq!(fs::read_to_string(&victim).unwrap(), "keep");
    }

    #[test]
    fn test_revert_without_record() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            revert(temp_dir.path(), &temp_dir.path().join(SUBSTITUTION_RECORD)).unwrap_err(),
            SubstitutionError::RecordMissing { .. }
        ));
    }
}
