use std::path::{Path, PathBuf};

/// Root directory of the source cache, passed explicitly to every DAO.
///
/// Each source owns a deterministic relative path below the root, so
/// distinct sources never share files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    dir: PathBuf,
}

impl CacheRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute location of a source's relative data path.
    pub fn resolve(&self, data_path: &str) -> PathBuf {
        self.dir.join(data_path)
    }
}
