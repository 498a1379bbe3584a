/*!
 * Program Registry
 * In-memory path → image table standing in for the file system
 */

use super::image::{LoaderError, LoaderResult, ProgramImage};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Registered programs, keyed by absolute path
#[derive(Clone)]
pub struct ProgramRegistry {
    programs: Arc<DashMap<String, Arc<ProgramImage>, RandomState>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self {
            programs: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Install `image` at `path`, replacing any previous program there
    pub fn register(&self, path: impl Into<String>, image: ProgramImage) {
        let path = path.into();
        debug!(path = %path, segments = image.segments().len(), "program registered");
        self.programs.insert(path, Arc::new(image));
    }

    /// Look up the program at `path` (vfs_open)
    ///
    /// Images are not validated here; exec validates before touching the caller.
    pub fn open(&self, path: &str) -> LoaderResult<Arc<ProgramImage>> {
        self.programs
            .get(path)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LoaderError::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.programs.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramRegistry")
            .field("programs", &self.programs.len())
            .finish()
    }
}
