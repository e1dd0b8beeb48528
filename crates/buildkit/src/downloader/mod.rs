//! Archive downloading, verification and extraction.
//!
//! This module provides the pieces the retrieval pipeline is built from:
//! checksum verification, verified HTTP downloads and safe archive extraction.

mod archive;
mod checksum;
mod file;

pub use archive::{
    ArchiveExtractor, ArchiveType, Compression, ExtractionReport, ReadSeek, TarUnpacker, Unpack,
    UnpackError, ZipUnpacker,
};
pub use checksum::{
    compute_checksum, compute_checksum_reader, verify_checksum, ChecksumType, ExpectedHash,
    HashError, Hasher,
};
pub use file::{DownloadObserver, DownloadOutcome, FileDownloader, NoProgress};
