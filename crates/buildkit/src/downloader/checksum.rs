//! Checksum computation and verification for downloaded archives.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            96 => Some(ChecksumType::Sha384),
            128 => Some(ChecksumType::Sha512),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumType::Md5),
            "sha1" => Some(ChecksumType::Sha1),
            "sha256" => Some(ChecksumType::Sha256),
            "sha384" => Some(ChecksumType::Sha384),
            "sha512" => Some(ChecksumType::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha384 => "sha384",
            ChecksumType::Sha512 => "sha512",
        }
    }

    fn hex_length(&self) -> usize {
        match self {
            ChecksumType::Md5 => 32,
            ChecksumType::Sha1 => 40,
            ChecksumType::Sha256 => 64,
            ChecksumType::Sha384 => 96,
            ChecksumType::Sha512 => 128,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid hex digest: {0}")]
    InvalidDigest(String),
}

/// A recorded digest, written as `algorithm:hexdigest` or as a bare hex digest
/// whose algorithm is inferred from its length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpectedHash {
    checksum_type: ChecksumType,
    digest: String,
}

impl ExpectedHash {
    pub fn new(checksum_type: ChecksumType, digest: &str) -> Result<Self, HashError> {
        let digest = digest.trim().to_ascii_lowercase();
        if digest.len() != checksum_type.hex_length()
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(HashError::InvalidDigest(digest));
        }
        Ok(Self { checksum_type, digest })
    }

    pub fn checksum_type(&self) -> ChecksumType {
        self.checksum_type
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn matches(&self, actual: &str) -> bool {
        self.digest.eq_ignore_ascii_case(actual)
    }
}

impl FromStr for ExpectedHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, digest)) => {
                let checksum_type = ChecksumType::from_name(name)
                    .ok_or_else(|| HashError::UnknownAlgorithm(name.to_string()))?;
                Self::new(checksum_type, digest)
            }
            None => {
                let digest = s.trim();
                let checksum_type = ChecksumType::from_hex_length(digest.len())
                    .ok_or_else(|| HashError::InvalidDigest(digest.to_string()))?;
                Self::new(checksum_type, digest)
            }
        }
    }
}

impl TryFrom<String> for ExpectedHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExpectedHash> for String {
    fn from(hash: ExpectedHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for ExpectedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.checksum_type.name(), self.digest)
    }
}

/// Incremental hasher over any of the supported checksum types
pub enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(checksum_type: ChecksumType) -> Self {
        match checksum_type {
            ChecksumType::Md5 => Hasher::Md5(Md5::new()),
            ChecksumType::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumType::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumType::Sha384 => Hasher::Sha384(Sha384::new()),
            ChecksumType::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    /// Lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Hasher::Md5(h) => format!("{:x}", h.finalize()),
            Hasher::Sha1(h) => format!("{:x}", h.finalize()),
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
            Hasher::Sha384(h) => format!("{:x}", h.finalize()),
            Hasher::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Compute the checksum of a byte stream
pub fn compute_checksum_reader<R: Read>(
    mut reader: R,
    checksum_type: ChecksumType,
) -> std::io::Result<String> {
    let mut hasher = Hasher::new(checksum_type);
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

/// Compute the checksum of a file without loading it into memory
pub async fn compute_checksum(path: &Path, checksum_type: ChecksumType) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Hasher::new(checksum_type);
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

/// Verify checksum of a file
pub async fn verify_checksum(path: &Path, expected: &ExpectedHash) -> std::io::Result<bool> {
    let actual = compute_checksum(path, expected.checksum_type()).await?;
    Ok(expected.matches(&actual))
}
