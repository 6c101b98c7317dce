//! Persisting cycles: the JSON snapshot artifact, the rolling log and the
//! optional last-summary file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use fusion_types::{CycleSnapshot, OutputSpec, Profile};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::dashboard::render_block;

/// Errors from writing or reading artifacts.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse snapshot {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Outcome of persisting one cycle.
#[derive(Debug, Default)]
pub struct Persisted {
    /// The snapshot artifact, if it was written.
    pub artifact: Option<PathBuf>,
    /// Every failure; already logged.
    pub errors: Vec<PersistenceError>,
}

impl Persisted {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes the artifacts of one instrument.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    symbol: String,
    output: OutputSpec,
}

impl SnapshotWriter {
    pub fn new(symbol: impl Into<String>, output: OutputSpec) -> Self {
        Self {
            symbol: symbol.into(),
            output,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.symbol.clone(), profile.output.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.output.directory
    }

    pub fn log_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.log_file)
    }

    pub fn summary_path(&self) -> Option<PathBuf> {
        self.output
            .summary_file
            .as_ref()
            .map(|name| self.output.directory.join(name))
    }

    /// Write the snapshot, append the log block and refresh the summary.
    ///
    /// Never fails: each error is logged and collected in the result, and a
    /// failed snapshot write does not prevent the log block.
    pub async fn persist(&self, snapshot: &CycleSnapshot, warnings: &[String]) -> Persisted {
        let mut errors = Vec::new();

        let artifact = match self.write_snapshot(snapshot).await {
            Ok(path) => {
                info!(symbol = %self.symbol, path = %path.display(), "Snapshot saved");
                Some(path)
            }
            Err(e) => {
                error!(symbol = %self.symbol, error = %e, "Failed to write snapshot");
                errors.push(e);
                None
            }
        };

        let block = render_block(&self.symbol, snapshot, warnings, artifact.as_deref());

        if let Err(e) = self.append_log(&block).await {
            error!(symbol = %self.symbol, error = %e, "Failed to append to log");
            errors.push(e);
        }
        if let Err(e) = self.write_summary(&block).await {
            error!(symbol = %self.symbol, error = %e, "Failed to write summary");
            errors.push(e);
        }

        Persisted { artifact, errors }
    }

    /// Write `<prefix>_<YYYYMMDD_HHMMSS>.json`, adding `_N` if the name is taken.
    ///
    /// The contents go to a private temp file first, which is then hard-linked
    /// under the first free name. Linking fails instead of replacing an
    /// existing file, so concurrent writers in the same second never clobber
    /// each other.
    pub async fn write_snapshot(&self, snapshot: &CycleSnapshot) -> Result<PathBuf, PersistenceError> {
        self.ensure_directory().await?;
        let json = serde_json::to_string_pretty(snapshot)?;

        let stem = self.stem(&snapshot.timestamp);
        let tmp = self.output.directory.join(format!(".{}.{}.tmp", stem, temp_suffix()));
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|source| PersistenceError::Write {
                path: tmp.clone(),
                source,
            })?;

        let linked = self.link_unique(&tmp, &stem).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        linked
    }

    /// Append a block to the rolling log.
    pub async fn append_log(&self, text: &str) -> Result<(), PersistenceError> {
        self.ensure_directory().await?;
        let path = self.log_path();
        let write_err = |source| PersistenceError::Write {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(text.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(())
    }

    /// Overwrite the last-summary file, if one is configured.
    pub async fn write_summary(&self, block: &str) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(path) = self.summary_path() else {
            return Ok(None);
        };
        self.ensure_directory().await?;
        write_atomic(&path, block.trim_start().as_bytes()).await?;
        Ok(Some(path))
    }

    async fn ensure_directory(&self) -> Result<(), PersistenceError> {
        let dir = &self.output.directory;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: dir.clone(),
                source,
            })
    }

    fn stem(&self, timestamp: &DateTime<Utc>) -> String {
        format!(
            "{}_{}",
            self.output.file_prefix,
            timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    async fn link_unique(&self, tmp: &Path, stem: &str) -> Result<PathBuf, PersistenceError> {
        let dir = &self.output.directory;
        let mut n = 0u32;
        loop {
            let candidate = if n == 0 {
                dir.join(format!("{}.json", stem))
            } else {
                dir.join(format!("{}_{}.json", stem, n))
            };
            match tokio::fs::hard_link(tmp, &candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(source) => {
                    return Err(PersistenceError::Write {
                        path: candidate,
                        source,
                    })
                }
            }
        }
    }
}

/// Read a persisted snapshot artifact.
pub async fn read_snapshot(path: impl AsRef<Path>) -> Result<CycleSnapshot, PersistenceError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| PersistenceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Distinguishes temp files of concurrent writers, across processes too.
fn temp_suffix() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Write to a hidden sibling, then rename over `path`.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let tmp = temp_sibling(path);
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::write(&tmp, contents).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
