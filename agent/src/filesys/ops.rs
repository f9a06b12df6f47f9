//! Narrow filesystem interface used by the deployment stages
//!
//! Workspaces, live artifacts and backups are the agent's only durable state.
//! Stages touch them exclusively through [`FileOps`] so tests can substitute
//! an in-memory implementation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::errors::DeployerError;
use crate::utils::to_hex;

/// Metadata for a single path
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A regular file found while listing a directory
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub meta: FileMeta,
}

#[async_trait]
pub trait FileOps: Send + Sync {
    /// Metadata for `path`, or `None` when nothing exists there
    async fn metadata(&self, path: &Path) -> Result<Option<FileMeta>, DeployerError>;

    /// First `len` bytes of a file (fewer when the file is shorter)
    async fn read_head(&self, path: &Path, len: usize) -> Result<Vec<u8>, DeployerError>;

    /// Hex SHA-256 digest of a file
    async fn sha256(&self, path: &Path) -> Result<String, DeployerError>;

    /// Regular files directly inside `dir`; empty when `dir` does not exist
    async fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>, DeployerError>;

    async fn create_dir_all(&self, path: &Path) -> Result<(), DeployerError>;

    /// Move a file, replacing anything at `to`
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), DeployerError>;

    /// Copy a file including its permission bits, returning the bytes copied
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, DeployerError>;

    /// Remove a file or symlink; absent paths are not an error
    async fn remove_file(&self, path: &Path) -> Result<(), DeployerError>;

    /// Create a symlink at `link` pointing to `target`
    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), DeployerError>;

    async fn exists(&self, path: &Path) -> Result<bool, DeployerError> {
        Ok(self.metadata(path).await?.is_some())
    }
}

/// [`FileOps`] backed by the local disk
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

fn to_meta(meta: &std::fs::Metadata) -> FileMeta {
    FileMeta {
        is_dir: meta.is_dir(),
        size: meta.len(),
        modified: meta.modified().ok(),
    }
}

#[async_trait]
impl FileOps for LocalFs {
    async fn metadata(&self, path: &Path) -> Result<Option<FileMeta>, DeployerError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(to_meta(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_head(&self, path: &Path, len: usize) -> Result<Vec<u8>, DeployerError> {
        let file = fs::File::open(path).await?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn sha256(&self, path: &Path) -> Result<String, DeployerError> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(to_hex(hasher.finalize()))
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>, DeployerError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push(FileEntry {
                    path: entry.path(),
                    meta: to_meta(&meta),
                });
            }
        }
        Ok(files)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), DeployerError> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), DeployerError> {
        fs::rename(from, to).await?;
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, DeployerError> {
        Ok(fs::copy(from, to).await?)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), DeployerError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), DeployerError> {
        #[cfg(unix)]
        {
            fs::symlink(target, link).await?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = (target, link);
            Err(DeployerError::Internal(
                "symlinks are only supported on unix".to_string(),
            ))
        }
    }
}
