//! Persisted, non-secret session preferences.
//!
//! Only the staff role and the process id survive a restart. Tokens are
//! never written here; [`SessionPrefs`] has no field that could hold one.

use common::types::ProcessId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Failed to access preferences file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preferences file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(Mutex<SessionPrefs>),
}

/// Preferences backed by a JSON file, or by memory when no path is set.
#[derive(Debug)]
pub struct PrefsStore {
    backing: Backing,
}

impl PrefsStore {
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::file(path),
            None => Self::memory(),
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(SessionPrefs::default())),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Read the stored prefs. A missing file reads as the default.
    ///
    /// # Errors
    ///
    /// Returns `PrefsError::Io` if the file exists but cannot be read, or
    /// `PrefsError::Malformed` if it does not contain valid prefs JSON.
    pub async fn load(&self) -> Result<SessionPrefs, PrefsError> {
        let path = match &self.backing {
            Backing::Memory(prefs) => {
                return Ok(prefs.lock().unwrap_or_else(PoisonError::into_inner).clone())
            }
            Backing::File(path) => path,
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "console.session", path = %path.display(), "No preferences file");
                return Ok(SessionPrefs::default());
            }
            Err(source) => {
                return Err(PrefsError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| PrefsError::Malformed {
            path: path.clone(),
            source,
        })
    }

    /// Replace the stored prefs.
    ///
    /// The file is written next to its final location and renamed over it,
    /// so a crash mid-write leaves the previous prefs intact.
    ///
    /// # Errors
    ///
    /// Returns `PrefsError::Io` if the file cannot be written.
    pub async fn save(&self, prefs: &SessionPrefs) -> Result<(), PrefsError> {
        let path = match &self.backing {
            Backing::Memory(stored) => {
                *stored.lock().unwrap_or_else(PoisonError::into_inner) = prefs.clone();
                return Ok(());
            }
            Backing::File(path) => path,
        };

        let io_err = |source| PrefsError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(prefs).map_err(|source| PrefsError::Malformed {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }

    /// Forget the role. The process id is kept so the next login reuses it.
    ///
    /// # Errors
    ///
    /// As [`save`](Self::save).
    pub async fn clear(&self) -> Result<(), PrefsError> {
        let current = self.load().await.unwrap_or_default();
        self.save(&SessionPrefs {
            role: None,
            process_id: current.process_id,
        })
        .await
    }
}
