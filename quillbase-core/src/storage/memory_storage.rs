// quillbase-core/src/storage/memory_storage.rs
// In-memory backend for tests and throwaway collections

use crate::error::Result;
use crate::storage::Storage;
use ahash::AHashMap;

/// Storage backend holding every named stream in a map. Nothing survives the
/// process; the crash-safety protocol degenerates to plain replacement.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: AHashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Pre-load a stream, e.g. a hand-crafted datafile for corruption tests.
    pub fn seed(&mut self, name: &str, data: &[u8]) {
        self.files.insert(name.to_string(), data.to_vec());
    }

    /// Current contents of a stream, if it exists.
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        Ok(self.files.entry(name.to_string()).or_default().clone())
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_creates_empty_stream() {
        let mut storage = MemoryStorage::new();
        assert!(storage.read("a.db").unwrap().is_empty());
        assert!(storage.contents("a.db").is_some());
    }

    #[test]
    fn test_append_and_write() {
        let mut storage = MemoryStorage::new();
        storage.append("a.db", b"1\n").unwrap();
        storage.append("a.db", b"2\n").unwrap();
        assert_eq!(storage.read("a.db").unwrap(), b"1\n2\n");

        storage.write("a.db", b"fresh\n").unwrap();
        assert_eq!(storage.read("a.db").unwrap(), b"fresh\n");
    }

    #[test]
    fn test_seed() {
        let mut storage = MemoryStorage::new();
        storage.seed("a.db", b"preloaded\n");
        assert_eq!(storage.read("a.db").unwrap(), b"preloaded\n");
    }
}
