//! Algorithm-tagged checksums naming source cache items

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use osforge_errors::{Error, ManifestError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::CHUNK_SIZE;

/// Both supported algorithms produce 256-bit digests.
const DIGEST_LEN: usize = 32;

/// Digest algorithms accepted in item checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    Sha256,
    Blake3,
}

impl ChecksumAlgorithm {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

/// A checksum of the form `<algorithm>:<hex digest>`.
///
/// Checksums double as the content address of an item in the source cache,
/// so the textual form is normalized to lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: Vec<u8>,
}

enum Digester {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

impl Checksum {
    /// Parse a tagged checksum string
    ///
    /// # Errors
    /// Returns a manifest error if the algorithm prefix is unknown or the
    /// digest is not valid hex of the right length.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let invalid = |message: String| ManifestError::Invalid { message };

        let (prefix, digest) = s
            .split_once(':')
            .ok_or_else(|| invalid(format!("checksum {s} has no algorithm prefix")))?;

        let algorithm = match prefix {
            "sha256" => ChecksumAlgorithm::Sha256,
            "blake3" => ChecksumAlgorithm::Blake3,
            other => return Err(invalid(format!("unsupported checksum algorithm: {other}")).into()),
        };

        let digest = hex::decode(digest)
            .map_err(|e| invalid(format!("checksum {s} is not valid hex: {e}")))?;
        if digest.len() != DIGEST_LEN {
            return Err(invalid(format!(
                "checksum {s} has {} digest bytes, expected {}",
                digest.len(),
                DIGEST_LEN
            ))
            .into());
        }

        Ok(Self { algorithm, digest })
    }

    /// Checksum of in-memory data
    #[must_use]
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        let mut digester = Digester::new(algorithm);
        digester.update(data);
        Self {
            algorithm,
            digest: digester.finalize(),
        }
    }

    /// Checksum of a file, streamed in chunks
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn compute_file(algorithm: ChecksumAlgorithm, path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        let mut digester = Digester::new(algorithm);
        let mut buffer = vec![0; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            digester.update(&buffer[..n]);
        }
        Ok(Self {
            algorithm,
            digest: digester.finalize(),
        })
    }

    #[must_use]
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Whether `data` hashes to this checksum
    #[must_use]
    pub fn verify_bytes(&self, data: &[u8]) -> bool {
        Self::compute(self.algorithm, data) == *self
    }

    /// Whether the file at `path` hashes to this checksum
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub async fn verify_file(&self, path: &Path) -> Result<bool, Error> {
        Ok(Self::compute_file(self.algorithm, path).await? == *self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.prefix(), self.digest_hex())
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
