//! A minimal named-byte-blob store: the only thing the codec layer needs
//! from the outside world is "read named blob" / "write named blob".
//! Lookups are case-insensitive, matching the DOS filesystems the games
//! shipped on.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::debug;

pub trait FileStore {
    /// Read a file by (case-insensitive) name, or None if it does not exist.
    fn read(&self, name: &str) -> Option<Vec<u8>>;
    /// Create or replace a file.
    fn write(&mut self, name: &str, data: Vec<u8>) -> Result<(), String>;
    /// All file names in the store.
    fn names(&self) -> Vec<String>;
}

/// In-memory store, used by tests and patch staging.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }
}

impl FileStore for MemStore {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(&name.to_ascii_lowercase()).cloned()
    }

    fn write(&mut self, name: &str, data: Vec<u8>) -> Result<(), String> {
        self.files.insert(name.to_ascii_lowercase(), data);
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A flat directory on disk.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> DirStore {
        DirStore { root: root.into() }
    }

    fn find_entry(&self, name: &str) -> Option<PathBuf> {
        let wanted = name.to_ascii_lowercase();
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().to_ascii_lowercase() == wanted {
                return Some(entry.path());
            }
        }
        None
    }
}

impl FileStore for DirStore {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.find_entry(name)?;
        match fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write(&mut self, name: &str, data: Vec<u8>) -> Result<(), String> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)
                .map_err(|e| format!("failed to create {}: {}", self.root.display(), e))?;
        }
        // Replace any existing file whose name differs only by case.
        let path = self
            .find_entry(name)
            .unwrap_or_else(|| self.root.join(name));
        fs::write(&path, data).map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }

    fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if entry.path().is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_is_case_insensitive() {
        let mut store = MemStore::new();
        store.write("WORDS.TOK", vec![1, 2, 3]).unwrap();
        assert_eq!(store.read("words.tok"), Some(vec![1, 2, 3]));
        assert_eq!(store.read("Words.Tok"), Some(vec![1, 2, 3]));
        assert_eq!(store.read("object"), None);
    }
}
