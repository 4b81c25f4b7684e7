// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Content-addressed blob store for code/config artifacts."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! One operation that matters: `put`. Two calls with byte-identical input
//! yield the same digest and stored path (spec §4.1, §8 invariant 4).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// The source could not be read, or the root is not writable.
    #[error("blob store io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobStoreError {
    /// The stable taxonomy code for this error (spec §7).
    #[must_use]
    pub fn code(&self) -> ledger_error::ErrorCode {
        match self {
            Self::Io(_) => ledger_error::ErrorCode::IoFailure,
        }
    }
}

/// The tuple `put` returns: digest, where it landed, and source size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    /// Lowercase hex SHA-256 digest of the source bytes (no `sha256:` prefix —
    /// that form is reserved for config `hash` fields, per §6.2).
    pub digest: String,
    /// The path the blob was (or already had been) written to.
    pub stored_path: PathBuf,
    /// Size in bytes of the stored content.
    pub size: u64,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressed store rooted at a filesystem directory
/// (`<root>/artifacts/<digest>`, per spec §6.3).
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store rooted at `root`. Does not create the directory;
    /// callers are expected to have run `ledger init` first.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `source_path`, compute its digest under the chain's hash
    /// algorithm (SHA-256) while streaming rather than buffering the
    /// whole file, and write it to `<root>/<digest>` unless a blob with
    /// that digest already exists.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Io`] if the source is unreadable or the
    /// root is not writable.
    #[tracing::instrument(skip(self), fields(source = %source_path.display()))]
    pub async fn put(&self, source_path: &Path) -> Result<BlobDescriptor, BlobStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp_name = format!(
            ".tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_path = self.root.join(tmp_name);

        let mut src = tokio::fs::File::open(source_path).await?;
        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        tmp.flush().await?;
        drop(tmp);

        let digest = format!("{:x}", hasher.finalize());
        let stored_path = self.root.join(&digest);

        if stored_path.try_exists()? {
            tokio::fs::remove_file(&tmp_path).await?;
            tracing::debug!(%digest, "blob already present, deduplicated");
        } else {
            tokio::fs::rename(&tmp_path, &stored_path).await?;
            tracing::debug!(%digest, size, "blob stored");
        }

        Ok(BlobDescriptor {
            digest,
            stored_path,
            size,
        })
    }

    /// Return whether a blob with `digest` exists, without reading its
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Io`] if the existence check itself fails.
    pub async fn exists(&self, digest: &str) -> Result<bool, BlobStoreError> {
        Ok(self.root.join(digest).try_exists()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_source(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let p = dir.join(name);
        tokio::fs::write(&p, content).await.unwrap();
        p
    }

    #[tokio::test]
    async fn put_dedups_identical_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path().join("artifacts"));
        let src = write_source(tmp.path(), "a.txt", b"hello world").await;

        let first = store.put(&src).await.unwrap();
        let second = store.put(&src).await.unwrap();

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.stored_path, second.stored_path);
        assert_eq!(first.size, 11);
    }

    #[tokio::test]
    async fn stored_bytes_equal_source_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path().join("artifacts"));
        let src = write_source(tmp.path(), "b.txt", b"payload bytes").await;

        let desc = store.put(&src).await.unwrap();
        let stored = tokio::fs::read(&desc.stored_path).await.unwrap();
        assert_eq!(stored, b"payload bytes");
    }

    #[tokio::test]
    async fn exists_reflects_prior_put() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path().join("artifacts"));
        let src = write_source(tmp.path(), "c.txt", b"x").await;

        let desc = store.put(&src).await.unwrap();
        assert!(store.exists(&desc.digest).await.unwrap());
        assert!(!store.exists("0000").await.unwrap());
    }

    #[tokio::test]
    async fn put_fails_on_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path().join("artifacts"));
        let missing = tmp.path().join("nope.txt");
        assert!(store.put(&missing).await.is_err());
    }
}
