//! Filesystem-backed artifact store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::hash::{CacheKey, normalize_subject};
use super::metadata::CacheMetadata;
use crate::Error;

const ARTIFACT_DIR: &str = "artifacts";
const METADATA_DIR: &str = "metadata";
const ARTIFACT_EXT: &str = "pdf";
const METADATA_EXT: &str = "json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cached artifact found on disk.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub path: PathBuf,
    /// Sidecar record, if it exists and parses.
    pub metadata: Option<CacheMetadata>,
}

impl CachedArtifact {
    /// Read the artifact bytes.
    pub async fn read(&self) -> Result<Vec<u8>, Error> {
        Ok(fs::read(&self.path).await?)
    }
}

/// On-disk cache of rendered documents, grouped by subject.
///
/// Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open a store rooted at `root`, creating the directory layout if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(ARTIFACT_DIR)).await?;
        fs::create_dir_all(root.join(METADATA_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(ARTIFACT_DIR)
            .join(key.subject())
            .join(format!("{}.{ARTIFACT_EXT}", key.stem()))
    }

    pub fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(key.subject())
            .join(format!("{}.{METADATA_EXT}", key.stem()))
    }

    /// Look up an artifact.
    ///
    /// Presence of the artifact file is what counts; a missing or unreadable
    /// sidecar does not invalidate the entry.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CachedArtifact>, Error> {
        let path = self.artifact_path(key);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let metadata = match fs::read(self.metadata_path(key)).await {
            Ok(bytes) => match serde_json::from_slice::<CacheMetadata>(&bytes) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!(stem = %key.stem(), error = %e, "unreadable cache sidecar");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(stem = %key.stem(), "cache hit");
        Ok(Some(CachedArtifact { key: key.clone(), path, metadata }))
    }

    /// Store an artifact and its sidecar.
    ///
    /// Both files are written to temporary names and renamed into place, the
    /// artifact first, so a reader that sees the artifact sees complete bytes.
    pub async fn put(&self, key: &CacheKey, bytes: &[u8], metadata: &CacheMetadata) -> Result<CachedArtifact, Error> {
        let path = self.artifact_path(key);
        let meta_path = self.metadata_path(key);

        write_atomic(&path, bytes).await?;
        let json = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&meta_path, &json).await?;

        tracing::info!(stem = %key.stem(), bytes = bytes.len(), "cached artifact");
        Ok(CachedArtifact { key: key.clone(), path, metadata: Some(metadata.clone()) })
    }

    /// Remove every entry for `subject`.
    ///
    /// Returns the number of artifacts deleted.
    pub async fn purge_subject(&self, subject: &str) -> Result<u64, Error> {
        let subject = normalize_subject(subject)?;
        let artifact_dir = self.root.join(ARTIFACT_DIR).join(&subject);
        let metadata_dir = self.root.join(METADATA_DIR).join(&subject);

        let count = count_files(&artifact_dir, ARTIFACT_EXT).await?;
        remove_dir_if_exists(&artifact_dir).await?;
        remove_dir_if_exists(&metadata_dir).await?;

        tracing::info!(subject = %subject, deleted = count, "purged subject from cache");
        Ok(count)
    }

    /// Remove entries whose artifact was written more than `age` ago.
    ///
    /// Returns the number of artifacts deleted.
    pub async fn purge_older_than(&self, age: Duration) -> Result<u64, Error> {
        let cutoff = SystemTime::now().checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH);
        let artifacts = self.root.join(ARTIFACT_DIR);
        let mut deleted = 0u64;

        let mut subjects = match fs::read_dir(&artifacts).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(subject_dir) = subjects.next_entry().await? {
            if !subject_dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = fs::read_dir(subject_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                    continue;
                }
                let modified = file.metadata().await?.modified()?;
                if modified >= cutoff {
                    continue;
                }

                fs::remove_file(&path).await?;
                if let Some(stem) = path.file_stem() {
                    let sidecar = self
                        .root
                        .join(METADATA_DIR)
                        .join(subject_dir.file_name())
                        .join(format!("{}.{METADATA_EXT}", stem.to_string_lossy()));
                    remove_file_if_exists(&sidecar).await?;
                }
                deleted += 1;
            }
        }

        tracing::info!(deleted, "purged stale artifacts from cache");
        Ok(deleted)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidDescriptor(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir).await?;

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    let tmp = dir.join(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn count_files(dir: &Path, ext: &str) -> Result<u64, Error> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) == Some(ext) {
            count += 1;
        }
    }
    Ok(count)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
