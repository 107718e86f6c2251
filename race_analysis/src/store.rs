//! Where raw session tables come from. The engine only reads through the
//! [`SessionStore`] trait; caching lives here, keyed explicitly by
//! [`SessionKey`].

use crate::error::AnalysisError;
use crate::raw::RawSession;
use crate::session::SessionKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub trait SessionStore: Send + Sync {
    fn load(&self, key: &SessionKey) -> Result<Arc<RawSession>, AnalysisError>;
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn load(&self, key: &SessionKey) -> Result<Arc<RawSession>, AnalysisError> {
        (**self).load(key)
    }
}

/// Reads `<root>/<race dir>/<session>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// A session name must be one plain file-name component, so a lookup can
/// never leave its race directory.
fn session_file_name(session: &str) -> Option<String> {
    let session = session.trim();
    if session.contains(['/', '\\']) {
        return None;
    }
    let mut components = Path::new(session).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(format!("{session}.json")),
        _ => None,
    }
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_err(path: &Path, err: std::io::Error) -> AnalysisError {
        AnalysisError::Io {
            path: path.to_path_buf(),
            err,
        }
    }

    /// First race directory, in name order, whose normalized name contains
    /// the normalized race name.
    fn race_dir(&self, race: &str) -> Result<Option<PathBuf>, AnalysisError> {
        let wanted = normalize(race);
        if wanted.is_empty() {
            return Ok(None);
        }
        let entries = fs::read_dir(&self.root).map_err(|err| Self::io_err(&self.root, err))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| Self::io_err(&self.root, err))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs.into_iter().find(|dir| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| normalize(n).contains(&wanted))
        }))
    }
}

impl SessionStore for JsonDirStore {
    fn load(&self, key: &SessionKey) -> Result<Arc<RawSession>, AnalysisError> {
        let not_found = || AnalysisError::DataNotFound {
            race: key.race.clone(),
            session: key.session.clone(),
        };
        let Some(file_name) = session_file_name(&key.session) else {
            tracing::warn!(session = %key.session, "rejected session name");
            return Err(not_found());
        };
        let dir = self.race_dir(&key.race)?.ok_or_else(not_found)?;
        let path = dir.join(file_name);
        if !path.is_file() {
            return Err(not_found());
        }
        let data = fs::read_to_string(&path).map_err(|err| Self::io_err(&path, err))?;
        let raw: RawSession =
            serde_json::from_str(&data).map_err(|err| AnalysisError::Decode { path: path.clone(), err })?;
        tracing::debug!(path = %path.display(), laps = raw.laps.len(), "loaded session file");
        Ok(Arc::new(raw))
    }
}

/// Keeps loaded sessions in memory until invalidated.
#[derive(Debug)]
pub struct CachedStore<S> {
    inner: S,
    cache: RwLock<HashMap<SessionKey, Arc<RawSession>>>,
}

impl<S: SessionStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drops one entry; returns whether it was cached.
    pub fn invalidate(&self, key: &SessionKey) -> bool {
        self.cache.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl<S: SessionStore> SessionStore for CachedStore<S> {
    fn load(&self, key: &SessionKey) -> Result<Arc<RawSession>, AnalysisError> {
        if let Some(hit) = self.cache.read().get(key) {
            return Ok(Arc::clone(hit));
        }
        let loaded = self.inner.load(key)?;
        // Another caller may have filled the slot meanwhile; keep theirs.
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(key.clone()).or_insert(loaded)))
    }
}
