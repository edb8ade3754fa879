//! Single-pass file digests
//!
//! One streaming read produces CRC32C, SHA-256, the byte count and any
//! optional digests requested. The source is rewound to position 0 before
//! and after the pass.

use bytes::Bytes;
use md5::Md5;
use pangea_domain::Result;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::errors::InfraError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Optional digests computed alongside the mandatory ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestSelection {
    pub md5: bool,
    pub sha1: bool,
    pub sha512: bool,
}

impl DigestSelection {
    pub fn all() -> Self {
        Self { md5: true, sha1: true, sha512: true }
    }
}

/// Lowercase hex digests and size of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Eight lowercase hex characters
    pub crc32c: String,
    pub sha256: String,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha512: Option<String>,
    pub size: u64,
}

/// Hash `source` from the start, leaving it rewound
///
/// # Errors
///
/// [`pangea_domain::PangeaError::Io`] on read or seek failures.
pub async fn digest<S>(source: &mut S, selection: DigestSelection) -> Result<FileDigest>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    source.rewind().await.map_err(InfraError::from)?;

    let mut crc = 0u32;
    let mut sha256 = Sha256::new();
    let mut md5 = selection.md5.then(Md5::new);
    let mut sha1 = selection.sha1.then(Sha1::new);
    let mut sha512 = selection.sha512.then(Sha512::new);
    let mut size = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = source.read(&mut buf).await.map_err(InfraError::from)?;
        if read == 0 {
            break;
        }
        let chunk = &buf[..read];
        crc = crc32c::crc32c_append(crc, chunk);
        sha256.update(chunk);
        if let Some(hasher) = md5.as_mut() {
            hasher.update(chunk);
        }
        if let Some(hasher) = sha1.as_mut() {
            hasher.update(chunk);
        }
        if let Some(hasher) = sha512.as_mut() {
            hasher.update(chunk);
        }
        size += read as u64;
    }

    source.rewind().await.map_err(InfraError::from)?;

    Ok(FileDigest {
        crc32c: format!("{crc:08x}"),
        sha256: hex::encode(sha256.finalize()),
        md5: md5.map(|hasher| hex::encode(hasher.finalize())),
        sha1: sha1.map(|hasher| hex::encode(hasher.finalize())),
        sha512: sha512.map(|hasher| hex::encode(hasher.finalize())),
        size,
    })
}

/// Read the whole source into memory, leaving it rewound
///
/// # Errors
///
/// [`pangea_domain::PangeaError::Io`] on read or seek failures.
pub async fn read_all<S>(source: &mut S) -> Result<Bytes>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    source.rewind().await.map_err(InfraError::from)?;
    let mut content = Vec::new();
    source.read_to_end(&mut content).await.map_err(InfraError::from)?;
    source.rewind().await.map_err(InfraError::from)?;
    Ok(Bytes::from(content))
}
