//! The refresh cookie jar.
//!
//! `/token` and `/refresh` answer with an HttpOnly `refresh_token` cookie.
//! The jar is the cookie provider of the HTTP client and, when a path is
//! configured, is saved next to the prefs file so a restarted process can
//! resume the session with a single `/refresh`.
//!
//! Only persistent cookies (those with `Max-Age` or `Expires`) are written.
//! On Unix the file is readable by its owner only.

use cookie_store::{CookieStore, RawCookie};
use reqwest::header::HeaderValue;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, trace};

/// File name of the jar, placed in the prefs directory.
pub const COOKIE_JAR_FILE: &str = "cookies.json";

#[derive(Debug, Error)]
pub enum CookieJarError {
    #[error("Failed to access cookie jar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cookie jar {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// The cookie store as reqwest sees it.
#[derive(Default)]
pub struct SharedCookies(RwLock<CookieStore>);

impl std::fmt::Debug for SharedCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedCookies").field(&"[REDACTED]").finish()
    }
}

impl SharedCookies {
    fn read(&self) -> RwLockReadGuard<'_, CookieStore> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CookieStore> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl reqwest::cookie::CookieStore for SharedCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| RawCookie::parse(value).ok())
            .map(RawCookie::into_owned);
        self.write().store_response_cookies(cookies, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .read()
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        trace!(target: "console.client", path = url.path(), "Attaching cookies");
        HeaderValue::from_str(&header).ok()
    }
}

/// Cookie store shared with reqwest, optionally backed by a file.
pub struct CookieJar {
    store: Arc<SharedCookies>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("path", &self.path)
            .field("cookies", &self.len())
            .finish()
    }
}

impl CookieJar {
    /// An empty jar saved to `path`, or kept in memory when `path` is `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            store: Arc::new(SharedCookies::default()),
            path,
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The store to hand to `reqwest::ClientBuilder::cookie_provider`.
    #[must_use]
    pub fn provider(&self) -> Arc<SharedCookies> {
        Arc::clone(&self.store)
    }

    /// Number of unexpired cookies held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().iter_unexpired().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the jar's contents with what is on disk. A missing file (or a
    /// memory-only jar) leaves the jar as it is.
    ///
    /// # Errors
    ///
    /// Returns `CookieJarError::Io` if the file exists but cannot be read, or
    /// `CookieJarError::Malformed` if it does not hold a cookie jar.
    pub async fn load(&self) -> Result<(), CookieJarError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "console.session", path = %path.display(), "No cookie jar file");
                return Ok(());
            }
            Err(source) => {
                return Err(CookieJarError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        let loaded = cookie_store::serde::json::load(bytes.as_slice()).map_err(|e| {
            CookieJarError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut store = self.store.write();
        *store = loaded;
        debug!(target: "console.session", cookies = store.iter_unexpired().count(), "Cookie jar loaded");
        Ok(())
    }

    /// Write the persistent cookies to disk. No-op for a memory-only jar.
    ///
    /// # Errors
    ///
    /// Returns `CookieJarError::Io` if the file cannot be written.
    pub async fn save(&self) -> Result<(), CookieJarError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut json = Vec::new();
        {
            let store = self.store.read();
            cookie_store::serde::json::save(&store, &mut json).map_err(|e| {
                CookieJarError::Malformed {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        let io_err = |source| CookieJarError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_err)?;
        }

        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }

    /// Drop every cookie and delete the file.
    ///
    /// # Errors
    ///
    /// Returns `CookieJarError::Io` if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), CookieJarError> {
        self.store.write().clear();

        let Some(path) = &self.path else {
            return Ok(());
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CookieJarError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}
