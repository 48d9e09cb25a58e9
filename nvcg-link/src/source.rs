//! Bitcode sources
//!
//! The loader never knows where blobs live; it asks a `BitcodeSource` for
//! the bytes of a unit by name.

use log::trace;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Backing store for compiled units' bitcode blobs
pub trait BitcodeSource: Send + Sync {
    /// Read the whole blob of `unit`
    fn read(&self, unit: &str) -> io::Result<Vec<u8>>;
}

/// Blobs held in memory, keyed by unit name
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    blobs: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit: &str, bytes: Vec<u8>) {
        self.blobs.insert(unit.to_string(), bytes);
    }

    pub fn with_blob(mut self, unit: &str, bytes: Vec<u8>) -> Self {
        self.insert(unit, bytes);
        self
    }
}

impl BitcodeSource for InMemorySource {
    fn read(&self, unit: &str) -> io::Result<Vec<u8>> {
        self.blobs.get(unit).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no bitcode registered for `{unit}`"))
        })
    }
}

/// Blobs stored as files. Units without an explicit path are looked up as
/// `<dir>/<unit>.bc` when a fallback directory is set.
#[derive(Debug, Default, Clone)]
pub struct FileSource {
    paths: HashMap<String, PathBuf>,
    dir: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dir(dir: &Path) -> Self {
        Self {
            paths: HashMap::new(),
            dir: Some(dir.to_path_buf()),
        }
    }

    pub fn with_path(mut self, unit: &str, path: PathBuf) -> Self {
        self.paths.insert(unit.to_string(), path);
        self
    }

    pub fn path_for(&self, unit: &str) -> Option<PathBuf> {
        self.paths
            .get(unit)
            .cloned()
            .or_else(|| self.dir.as_ref().map(|dir| dir.join(format!("{unit}.bc"))))
    }
}

impl BitcodeSource for FileSource {
    fn read(&self, unit: &str) -> io::Result<Vec<u8>> {
        let path = self.path_for(unit).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no bitcode path for `{unit}`"))
        })?;
        trace!("reading bitcode for '{}' from {}", unit, path.display());
        std::fs::read(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::new().with_blob("core", vec![1, 2, 3]);
        assert_eq!(source.read("core").unwrap(), vec![1, 2, 3]);
        assert_eq!(source.read("alloc").unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("core.bc"), b"abc").unwrap();
        let explicit = dir.path().join("elsewhere.bin");
        std::fs::write(&explicit, b"xyz").unwrap();

        let source = FileSource::from_dir(dir.path()).with_path("app", explicit);
        assert_eq!(source.read("core").unwrap(), b"abc".to_vec());
        assert_eq!(source.read("app").unwrap(), b"xyz".to_vec());
        assert_eq!(source.read("missing").unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(FileSource::new().read("core").is_err());
    }
}
