//! Archive extraction (zip, tar, tar.gz, tar.bz2, tar.xz).
//!
//! Every format sits behind the [`Unpack`] trait, which only sees a byte
//! source, a destination and a strip count. [`ArchiveExtractor`] picks the
//! format, maps failures to retrieval errors and provides the all-or-nothing
//! [`ArchiveExtractor::extract`].

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::util::resolves_within;
use crate::{Result, RetrievalError};

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".zip") {
            Some(ArchiveType::Zip)
        } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(ArchiveType::TarGz)
        } else if path_str.ends_with(".tar.bz2") || path_str.ends_with(".tbz2") {
            Some(ArchiveType::TarBz2)
        } else if path_str.ends_with(".tar.xz") || path_str.ends_with(".txz") {
            Some(ArchiveType::TarXz)
        } else if path_str.ends_with(".tar") {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// The extraction capability for this format
    pub fn unpacker(&self) -> Box<dyn Unpack> {
        match self {
            ArchiveType::Zip => Box::new(ZipUnpacker),
            ArchiveType::Tar => Box::new(TarUnpacker::new(Compression::None)),
            ArchiveType::TarGz => Box::new(TarUnpacker::new(Compression::Gzip)),
            ArchiveType::TarBz2 => Box::new(TarUnpacker::new(Compression::Bzip2)),
            ArchiveType::TarXz => Box::new(TarUnpacker::new(Compression::Xz)),
        }
    }
}

/// Failure inside a format implementation, before the archive path is known
#[derive(Debug)]
pub enum UnpackError {
    /// Entry would land outside the destination
    Unsafe(String),
    /// Malformed archive
    Format(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for UnpackError {
    fn from(e: std::io::Error) -> Self {
        UnpackError::Io(e)
    }
}

/// Counts of what an extraction wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files: usize,
    pub directories: usize,
    pub links: usize,
}

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// A format-specific extraction capability
pub trait Unpack {
    /// Extract every entry of `source` below `dest`, dropping the first
    /// `strip_components` path components of each entry. `dest` must exist.
    fn unpack(
        &self,
        source: &mut dyn ReadSeek,
        dest: &Path,
        strip_components: usize,
    ) -> std::result::Result<ExtractionReport, UnpackError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

pub struct TarUnpacker {
    compression: Compression,
}

impl TarUnpacker {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn unpack_reader<R: Read>(
        reader: R,
        dest: &Path,
        strip_components: usize,
    ) -> std::result::Result<ExtractionReport, UnpackError> {
        let mut archive = tar::Archive::new(reader);
        let root = dest.canonicalize()?;
        let mut report = ExtractionReport::default();

        let entries = archive
            .entries()
            .map_err(|e| UnpackError::Format(format!("Failed to read tar: {}", e)))?;

        for entry in entries {
            let mut entry = entry
                .map_err(|e| UnpackError::Format(format!("Failed to read tar entry: {}", e)))?;

            let raw_path = entry
                .path()
                .map_err(|e| UnpackError::Format(format!("Invalid path in tar: {}", e)))?
                .into_owned();

            let relative = match strip_path(&raw_path, strip_components)? {
                Some(relative) => relative,
                None => continue,
            };
            let outpath = prepare_destination(&root, &relative, &raw_path)?;
            let entry_type = entry.header().entry_type();

            if entry_type.is_dir() {
                fs::create_dir_all(&outpath)?;
                report.directories += 1;
            } else if entry_type.is_hard_link() {
                let link_name = entry
                    .link_name()
                    .map_err(|e| UnpackError::Format(format!("Invalid link in tar: {}", e)))?
                    .ok_or_else(|| UnpackError::Format(format!("Hard link without target: {}", raw_path.display())))?
                    .into_owned();
                let target = match strip_path(&link_name, strip_components)? {
                    Some(target) => root.join(target),
                    None => return Err(UnpackError::Unsafe(link_name.display().to_string())),
                };
                let canonical_target = target.canonicalize()?;
                if !canonical_target.starts_with(&root) {
                    return Err(UnpackError::Unsafe(link_name.display().to_string()));
                }
                if fs::symlink_metadata(&outpath).is_ok() {
                    fs::remove_file(&outpath)?;
                }
                fs::hard_link(&canonical_target, &outpath)?;
                report.links += 1;
            } else if entry_type.is_file() || entry_type.is_symlink() || entry_type == tar::EntryType::Continuous {
                entry
                    .unpack(&outpath)
                    .map_err(|e| UnpackError::Format(format!("Failed to extract {}: {}", raw_path.display(), e)))?;
                if entry_type.is_symlink() {
                    report.links += 1;
                } else {
                    report.files += 1;
                }
            } else {
                log::debug!("Skipping special tar entry {}", raw_path.display());
            }
        }

        Ok(report)
    }
}

impl Unpack for TarUnpacker {
    fn unpack(
        &self,
        source: &mut dyn ReadSeek,
        dest: &Path,
        strip_components: usize,
    ) -> std::result::Result<ExtractionReport, UnpackError> {
        let reader = BufReader::new(source);
        match self.compression {
            Compression::None => Self::unpack_reader(reader, dest, strip_components),
            Compression::Gzip => Self::unpack_reader(GzDecoder::new(reader), dest, strip_components),
            Compression::Bzip2 => Self::unpack_reader(BzDecoder::new(reader), dest, strip_components),
            Compression::Xz => Self::unpack_reader(XzDecoder::new(reader), dest, strip_components),
        }
    }
}

pub struct ZipUnpacker;

impl Unpack for ZipUnpacker {
    fn unpack(
        &self,
        source: &mut dyn ReadSeek,
        dest: &Path,
        strip_components: usize,
    ) -> std::result::Result<ExtractionReport, UnpackError> {
        let mut archive = zip::ZipArchive::new(source)
            .map_err(|e| UnpackError::Format(format!("Failed to open zip: {}", e)))?;
        let root = dest.canonicalize()?;
        let mut report = ExtractionReport::default();

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| UnpackError::Format(format!("Failed to read zip entry: {}", e)))?;

            let raw_path = PathBuf::from(file.name());
            let relative = match strip_path(&raw_path, strip_components)? {
                Some(relative) => relative,
                None => continue,
            };
            let outpath = prepare_destination(&root, &relative, &raw_path)?;
            let mode = file.unix_mode();

            if file.is_dir() {
                fs::create_dir_all(&outpath)?;
                report.directories += 1;
                continue;
            }

            #[cfg(unix)]
            {
                if mode.is_some_and(|m| m & 0o170000 == 0o120000) {
                    let mut target = String::new();
                    file.read_to_string(&mut target)?;
                    if fs::symlink_metadata(&outpath).is_ok() {
                        fs::remove_file(&outpath)?;
                    }
                    std::os::unix::fs::symlink(&target, &outpath)?;
                    report.links += 1;
                    continue;
                }
            }

            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
            report.files += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = mode {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }
            #[cfg(not(unix))]
            let _ = mode;
        }

        Ok(report)
    }
}

/// Drop the first `strip_components` components of an entry path.
///
/// Entries containing parent, root or prefix components are rejected whatever
/// the strip count. Returns `None` when nothing is left after stripping.
fn strip_path(path: &Path, strip_components: usize) -> std::result::Result<Option<PathBuf>, UnpackError> {
    let mut stripped = PathBuf::new();
    let mut seen = 0;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                if seen >= strip_components {
                    stripped.push(part);
                }
                seen += 1;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UnpackError::Unsafe(path.display().to_string()));
            }
        }
    }

    if stripped.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stripped))
    }
}

/// Resolve the output path of an entry and create its parent directories.
///
/// The nearest existing ancestor is canonicalized before anything is created
/// so that a symlink extracted earlier cannot redirect writes outside `root`.
fn prepare_destination(
    root: &Path,
    relative: &Path,
    raw_path: &Path,
) -> std::result::Result<PathBuf, UnpackError> {
    let outpath = root.join(relative);
    let parent = outpath.parent().unwrap_or(root);

    if !resolves_within(root, parent)? {
        return Err(UnpackError::Unsafe(raw_path.display().to_string()));
    }

    fs::create_dir_all(parent)?;
    Ok(outpath)
}

/// Archive extractor
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extract `archive_path` into `dest_dir`, which must not exist yet.
    ///
    /// Entries are extracted into a temporary sibling directory that is renamed
    /// to `dest_dir` only after every entry succeeded, so a failure never
    /// leaves a partially populated `dest_dir` behind.
    pub fn extract(archive_path: &Path, dest_dir: &Path, strip_components: usize) -> Result<ExtractionReport> {
        if fs::symlink_metadata(dest_dir).is_ok() {
            return Err(RetrievalError::Extraction {
                archive: archive_path.to_path_buf(),
                reason: format!("destination already exists: {}", dest_dir.display()),
            });
        }

        let parent = match dest_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| RetrievalError::io(parent, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(parent)
            .map_err(|e| RetrievalError::io(parent, e))?;

        let report = Self::unpack_into(archive_path, staging.path(), strip_components)?;

        fs::rename(staging.path(), dest_dir).map_err(|e| RetrievalError::io(dest_dir, e))?;
        Ok(report)
    }

    /// Extract `archive_path` into the existing directory `dest_dir`, merging
    /// with whatever is already there
    pub fn unpack_into(archive_path: &Path, dest_dir: &Path, strip_components: usize) -> Result<ExtractionReport> {
        let archive_type = ArchiveType::from_path(archive_path).ok_or_else(|| {
            RetrievalError::UnknownArchiveType {
                path: archive_path.to_path_buf(),
            }
        })?;

        Self::unpack_with(archive_type.unpacker().as_ref(), archive_path, dest_dir, strip_components)
    }

    /// Extract `archive_path` into `root/relative`, refusing when a symlink
    /// already under `root` would carry `relative` outside of it
    pub fn unpack_below(
        archive_path: &Path,
        root: &Path,
        relative: &Path,
        strip_components: usize,
    ) -> Result<ExtractionReport> {
        let canonical_root = root.canonicalize().map_err(|e| RetrievalError::io(root, e))?;
        let dest = canonical_root.join(relative);

        let inside = resolves_within(&canonical_root, &dest).map_err(|e| RetrievalError::io(&dest, e))?;
        if !inside {
            return Err(RetrievalError::UnsafeArchiveEntry {
                archive: archive_path.to_path_buf(),
                entry: relative.display().to_string(),
            });
        }

        Self::unpack_into(archive_path, &dest, strip_components)
    }

    /// Extract with an explicit format implementation
    pub fn unpack_with(
        unpacker: &dyn Unpack,
        archive_path: &Path,
        dest_dir: &Path,
        strip_components: usize,
    ) -> Result<ExtractionReport> {
        fs::create_dir_all(dest_dir).map_err(|e| RetrievalError::io(dest_dir, e))?;
        let mut file = File::open(archive_path).map_err(|e| RetrievalError::io(archive_path, e))?;

        log::debug!(
            "Extracting {} into {} (strip {})",
            archive_path.display(),
            dest_dir.display(),
            strip_components
        );

        unpacker
            .unpack(&mut file, dest_dir, strip_components)
            .map_err(|e| match e {
                UnpackError::Unsafe(entry) => RetrievalError::UnsafeArchiveEntry {
                    archive: archive_path.to_path_buf(),
                    entry,
                },
                UnpackError::Format(reason) => RetrievalError::Extraction {
                    archive: archive_path.to_path_buf(),
                    reason,
                },
                UnpackError::Io(e) => RetrievalError::Extraction {
                    archive: archive_path.to_path_buf(),
                    reason: e.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a tar.gz with raw entry names, bypassing the builder's path checks
    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content, mode) in entries {
            let mut header = tar::Header::new_gnu();
            let name_bytes = name.as_bytes();
            header.as_gnu_mut().unwrap().name[..name_bytes.len()].copy_from_slice(name_bytes);
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_archive_type_from_path() {
        assert_eq!(ArchiveType::from_path(Path::new("package.zip")), Some(ArchiveType::Zip));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar.gz")), Some(ArchiveType::TarGz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tgz")), Some(ArchiveType::TarGz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar.bz2")), Some(ArchiveType::TarBz2));
        assert_eq!(ArchiveType::from_path(Path::new("chromium-1.0.tar.xz")), Some(ArchiveType::TarXz));
        assert_eq!(ArchiveType::from_path(Path::new("package.tar")), Some(ArchiveType::Tar));
        assert_eq!(ArchiveType::from_path(Path::new("package.txt")), None);
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(
            strip_path(Path::new("chromium-1.0/base/file.cc"), 1).unwrap(),
            Some(PathBuf::from("base/file.cc"))
        );
        assert_eq!(strip_path(Path::new("chromium-1.0/"), 1).unwrap(), None);
        assert_eq!(
            strip_path(Path::new("./a/b"), 0).unwrap(),
            Some(PathBuf::from("a/b"))
        );
        assert!(matches!(strip_path(Path::new("a/../../b"), 1), Err(UnpackError::Unsafe(_))));
        assert!(matches!(strip_path(Path::new("/etc/passwd"), 0), Err(UnpackError::Unsafe(_))));
    }

    #[test]
    fn test_extract_strips_and_keeps_modes() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("source.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("chromium-1.0/README", b"readme", 0o644),
                ("chromium-1.0/build/run.sh", b"#!/bin/sh\n", 0o755),
            ],
        );

        let dest = temp_dir.path().join("tree");
        let report = ArchiveExtractor::extract(&archive, &dest, 1).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(fs::read(dest.join("README")).unwrap(), b"readme");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("build/run.sh")).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_extract_rejects_parent_traversal_and_leaves_no_tree() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evil.tar.gz");
        write_tar_gz(
            &archive,
            &[("ok.txt", b"fine", 0o644), ("../escape.txt", b"escaped", 0o644)],
        );

        let dest = temp_dir.path().join("tree");
        let err = ArchiveExtractor::extract(&archive, &dest, 0).unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::UnsafeArchiveEntry { ref entry, .. } if entry == "../escape.txt"
        ));
        assert!(!dest.exists());
        assert!(!temp_dir.path().join("escape.txt").exists());
        // Only the archive is left: the staging directory was removed
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_extract_refuses_existing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("source.tar.gz");
        write_tar_gz(&archive, &[("a.txt", b"a", 0o644)]);
        let dest = temp_dir.path().join("tree");
        fs::create_dir(&dest).unwrap();

        let err = ArchiveExtractor::extract(&archive, &dest, 0).unwrap_err();
        assert!(matches!(err, RetrievalError::Extraction { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cannot_redirect_writes() {
        let temp_dir = TempDir::new().unwrap();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();

        let archive = temp_dir.path().join("links.tar");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder.append_link(&mut link, "escape", &outside).unwrap();

            let mut file = tar::Header::new_gnu();
            file.set_size(3);
            file.set_mode(0o644);
            file.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut file, "escape/pwned.txt", &b"bad"[..]).unwrap();
            builder.finish().unwrap();
        }

        let dest = temp_dir.path().join("tree");
        let err = ArchiveExtractor::extract(&archive, &dest, 0).unwrap_err();

        assert!(matches!(err, RetrievalError::UnsafeArchiveEntry { .. }));
        assert!(!outside.join("pwned.txt").exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_zip_rejects_parent_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evil.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("ok.txt", options).unwrap();
            zip.write_all(b"fine").unwrap();
            zip.start_file("../escape.txt", options).unwrap();
            zip.write_all(b"escaped").unwrap();
            zip.finish().unwrap();
        }

        let dest = temp_dir.path().join("tree");
        let err = ArchiveExtractor::extract(&archive, &dest, 0).unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::UnsafeArchiveEntry { ref entry, .. } if entry == "../escape.txt"
        ));
        assert!(!dest.exists());
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_symlink_cannot_redirect_writes() {
        let temp_dir = TempDir::new().unwrap();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();

        let archive = temp_dir.path().join("links.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.add_symlink("pkg/escape", outside.to_str().unwrap(), options).unwrap();
            zip.start_file("pkg/escape/pwned.txt", options).unwrap();
            zip.write_all(b"bad").unwrap();
            zip.finish().unwrap();
        }

        let dest = temp_dir.path().join("tree");
        let err = ArchiveExtractor::extract(&archive, &dest, 1).unwrap_err();

        assert!(matches!(err, RetrievalError::UnsafeArchiveEntry { .. }));
        assert!(!outside.join("pwned.txt").exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_unknown_archive_type() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("source.rar");
        fs::write(&archive, b"").unwrap();

        let err = ArchiveExtractor::unpack_into(&archive, temp_dir.path(), 0).unwrap_err();
        assert!(matches!(err, RetrievalError::UnknownArchiveType { .. }));
    }
}
