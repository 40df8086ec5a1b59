//! SHA-1 and MD5 checksum utilities
//!
//! Checksums are lowercase hex strings. Content digests are always computed in
//! a single streaming pass through [`DigestingReader`]; callers never buffer a
//! whole artifact to hash it.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use md5::Md5;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Sha1,
    Md5,
}

impl ChecksumType {
    pub const ALL: [ChecksumType; 2] = [ChecksumType::Sha1, ChecksumType::Md5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        }
    }

    /// File extension of a checksum sidecar, e.g. `.sha1`.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Sha1 => ".sha1",
            Self::Md5 => ".md5",
        }
    }

    /// Length of the hex representation.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Md5 => 32,
        }
    }

    /// The other supported algorithm.
    pub fn other(&self) -> Self {
        match self {
            Self::Sha1 => Self::Md5,
            Self::Md5 => Self::Sha1,
        }
    }

    /// Whether `value` is a well-formed hex checksum of this type.
    pub fn is_valid(&self, value: &str) -> bool {
        value.len() == self.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            other => Err(format!("unknown checksum type: {other}")),
        }
    }
}

/// Declared (`original`) and computed (`actual`) checksum of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    pub checksum_type: ChecksumType,
    pub original: Option<String>,
    pub actual: Option<String>,
}

impl ChecksumInfo {
    pub fn new(checksum_type: ChecksumType, original: Option<String>, actual: Option<String>) -> Self {
        Self {
            checksum_type,
            original: original.map(|o| o.to_ascii_lowercase()),
            actual: actual.map(|a| a.to_ascii_lowercase()),
        }
    }

    /// True when nothing was declared or the declaration equals the computed value.
    pub fn checksums_match(&self) -> bool {
        match &self.original {
            None => true,
            Some(original) => self.actual.as_deref() == Some(original.as_str()),
        }
    }
}

/// Both checksums of one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumPair {
    pub sha1: String,
    pub md5: String,
}

impl ChecksumPair {
    pub fn new(sha1: impl Into<String>, md5: impl Into<String>) -> Self {
        Self {
            sha1: sha1.into(),
            md5: md5.into(),
        }
    }

    pub fn get(&self, checksum_type: ChecksumType) -> &str {
        match checksum_type {
            ChecksumType::Sha1 => &self.sha1,
            ChecksumType::Md5 => &self.md5,
        }
    }
}

/// Result of digesting a content stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub size: u64,
    pub checksums: ChecksumPair,
}

/// Reader adapter that hashes bytes as they pass through.
pub struct DigestingReader<R> {
    inner: R,
    sha1: Sha1,
    md5: Md5,
    size: u64,
}

impl<R: Read> DigestingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            sha1: Sha1::new(),
            md5: Md5::new(),
            size: 0,
        }
    }

    /// Bytes read so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finish hashing and return the digest of everything read.
    pub fn finish(self) -> ContentDigest {
        ContentDigest {
            size: self.size,
            checksums: ChecksumPair {
                sha1: format!("{:x}", self.sha1.finalize()),
                md5: format!("{:x}", self.md5.finalize()),
            },
        }
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sha1.update(&buf[..n]);
        self.md5.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}

/// Digest a stream to its end.
pub fn compute_checksums(reader: impl Read) -> io::Result<ContentDigest> {
    let mut digesting = DigestingReader::new(reader);
    io::copy(&mut digesting, &mut io::sink())?;
    Ok(digesting.finish())
}

/// Digest in-memory content.
pub fn compute_content_checksums(content: &[u8]) -> ContentDigest {
    let mut digesting = DigestingReader::new(content);
    // Reading from a slice into a sink cannot fail.
    let _ = io::copy(&mut digesting, &mut io::sink());
    digesting.finish()
}
