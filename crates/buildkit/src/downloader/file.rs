//! File downloader for HTTP/HTTPS archives.
//!
//! A destination is only ever written by renaming a fully downloaded and
//! verified temporary file into place, so the downloads directory holds either
//! verified archives or nothing at all.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::http::{HttpClient, HttpError};
use crate::{Result, RetrievalError};

use super::checksum::{compute_checksum, ExpectedHash, Hasher};

/// Receives download progress. Implementations must not influence the result.
pub trait DownloadObserver: Send + Sync {
    fn started(&self, _name: &str, _total: Option<u64>) {}

    fn advanced(&self, name: &str, downloaded: u64, total: Option<u64>);

    fn finished(&self, _name: &str) {}
}

/// Observer that discards all progress
pub struct NoProgress;

impl DownloadObserver for NoProgress {
    fn advanced(&self, _name: &str, _downloaded: u64, _total: Option<u64>) {}
}

/// What happened to a single download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already existed with the expected checksum
    AlreadyVerified,
    /// The archive was transferred and verified
    Downloaded { bytes: u64 },
}

/// File downloader for HTTP archives
pub struct FileDownloader {
    http_client: Arc<HttpClient>,
}

impl FileDownloader {
    /// Create a new file downloader
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self { http_client }
    }

    /// Make sure `dest` holds the archive at `url` with the expected checksum.
    ///
    /// An existing destination is verified and never re-downloaded: a mismatch
    /// is an error, not a cache miss.
    pub async fn fetch_verified(
        &self,
        name: &str,
        url: &str,
        dest: &Path,
        expected: &ExpectedHash,
        observer: &dyn DownloadObserver,
    ) -> Result<DownloadOutcome> {
        match tokio::fs::metadata(dest).await {
            Ok(metadata) => {
                if !metadata.is_file() {
                    return Err(RetrievalError::NotAFile {
                        path: dest.to_path_buf(),
                    });
                }

                let actual = compute_checksum(dest, expected.checksum_type())
                    .await
                    .map_err(|e| RetrievalError::io(dest, e))?;

                if !expected.matches(&actual) {
                    return Err(RetrievalError::HashMismatch {
                        path: dest.to_path_buf(),
                        expected: expected.to_string(),
                        actual,
                    });
                }

                log::debug!("{} already downloaded and verified: {}", name, dest.display());
                Ok(DownloadOutcome::AlreadyVerified)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.download_verified(name, url, dest, expected, observer).await
            }
            Err(e) => Err(RetrievalError::io(dest, e)),
        }
    }

    /// Stream `url` into a temporary sibling of `dest`, hashing as bytes
    /// arrive, and rename it into place only when the digest matches
    async fn download_verified(
        &self,
        name: &str,
        url: &str,
        dest: &Path,
        expected: &ExpectedHash,
        observer: &dyn DownloadObserver,
    ) -> Result<DownloadOutcome> {
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = format!(
            ".{}.",
            dest.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string())
        );

        // Dropping the temp file (error, cancellation) removes it
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".partial")
            .tempfile_in(parent)
            .map_err(|e| RetrievalError::io(parent, e))?;
        let mut file = tokio::fs::File::from_std(
            temp.reopen().map_err(|e| RetrievalError::io(temp.path(), e))?,
        );

        log::info!("Downloading {} from {}", name, url);
        let response = self
            .http_client
            .get(url)
            .await
            .map_err(|source| RetrievalError::Download {
                target: name.to_string(),
                source,
            })?;

        let total = response.content_length();
        observer.started(name, total);

        let mut hasher = Hasher::new(expected.checksum_type());
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RetrievalError::Download {
                target: name.to_string(),
                source: HttpError::Request(e),
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| RetrievalError::io(temp.path(), e))?;
            downloaded += chunk.len() as u64;
            observer.advanced(name, downloaded, total);
        }

        file.flush()
            .await
            .map_err(|e| RetrievalError::io(temp.path(), e))?;
        drop(file);
        observer.finished(name);

        let actual = hasher.finalize();
        if !expected.matches(&actual) {
            return Err(RetrievalError::HashMismatch {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }

        temp.persist(dest)
            .map_err(|e| RetrievalError::io(dest, e.error))?;
        log::debug!("Downloaded {} ({} bytes) to {}", name, downloaded, dest.display());

        Ok(DownloadOutcome::Downloaded { bytes: downloaded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::checksum::{compute_checksum_reader, ChecksumType};
    use tempfile::TempDir;

    // Nothing listens on the discard port; any request would fail
    const UNREACHABLE_URL: &str = "http://127.0.0.1:9/archive.tar.gz";

    fn sha256_of(content: &[u8]) -> ExpectedHash {
        let digest = compute_checksum_reader(content, ChecksumType::Sha256).unwrap();
        ExpectedHash::new(ChecksumType::Sha256, &digest).unwrap()
    }

    fn downloader() -> FileDownloader {
        FileDownloader::new(Arc::new(HttpClient::new().unwrap()))
    }

    #[tokio::test]
    async fn test_existing_valid_file_skips_network() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        std::fs::write(&dest, b"archive bytes").unwrap();

        let outcome = downloader()
            .fetch_verified("source", UNREACHABLE_URL, &dest, &sha256_of(b"archive bytes"), &NoProgress)
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::AlreadyVerified);
    }

    #[tokio::test]
    async fn test_existing_invalid_file_is_a_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        std::fs::write(&dest, b"tampered bytes").unwrap();

        let err = downloader()
            .fetch_verified("source", UNREACHABLE_URL, &dest, &sha256_of(b"archive bytes"), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RetrievalError::HashMismatch { ref path, .. } if path == &dest));
        // The pinned file is left alone
        assert_eq!(std::fs::read(&dest).unwrap(), b"tampered bytes");
    }

    #[tokio::test]
    async fn test_existing_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        std::fs::create_dir(&dest).unwrap();

        let err = downloader()
            .fetch_verified("source", UNREACHABLE_URL, &dest, &sha256_of(b"x"), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RetrievalError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn test_network_failure_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");

        let err = downloader()
            .fetch_verified("source", UNREACHABLE_URL, &dest, &sha256_of(b"x"), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RetrievalError::Download { .. }));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
