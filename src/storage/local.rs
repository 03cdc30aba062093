//! Local-directory file store
//!
//! Serves a single directory as the flat namespace. Names never resolve
//! outside the root: separators and parent references are rejected before
//! any filesystem access.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::{FileInfo, FileStore};

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a client-supplied name to a path under the root.
    ///
    /// The namespace is flat: a leading `/` is tolerated, anything else
    /// that navigates (separators, `..`, NUL) is invalid input.
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let name = name.trim_start_matches('/');
        if name.is_empty()
            || name.contains(['/', '\\', '\0'])
            || name.contains("..")
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {name:?}"),
            ));
        }
        Ok(self.root.join(name))
    }
}

impl FileStore for LocalFileStore {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.resolve(name)?)?))
    }

    fn open_write(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(self.resolve(name)?)?))
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn stat(&self, name: &str) -> io::Result<FileInfo> {
        let metadata = fs::metadata(self.resolve(name)?)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a regular file: {name}"),
            ));
        }
        Ok(FileInfo {
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("data")).unwrap();
        (dir, store)
    }

    #[test]
    fn round_trips_file_content() {
        let (_dir, store) = store();
        store
            .open_write("hello.txt")
            .unwrap()
            .write_all(b"hello")
            .unwrap();
        let mut out = String::new();
        store
            .open_read("hello.txt")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello");
        assert!(store.exists("hello.txt"));
        assert_eq!(store.stat("hello.txt").unwrap().size, 5);
    }

    #[test]
    fn leading_slash_is_tolerated() {
        let (_dir, store) = store();
        store
            .open_write("/doc.txt")
            .unwrap()
            .write_all(b"x")
            .unwrap();
        assert!(store.exists("doc.txt"));
    }

    #[test]
    fn navigating_names_are_rejected() {
        let (_dir, store) = store();
        for bad in ["../escape", "a/b", "a\\b", "..", ""] {
            assert!(store.open_read(bad).is_err(), "{bad:?} should be invalid");
            assert!(!store.exists(bad));
        }
    }

    #[test]
    fn listing_skips_directories() {
        let (_dir, store) = store();
        store.open_write("b.txt").unwrap().write_all(b"b").unwrap();
        store.open_write("a.txt").unwrap().write_all(b"a").unwrap();
        fs::create_dir(store.root().join("subdir")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn stat_missing_file_is_not_found() {
        let (_dir, store) = store();
        assert_eq!(
            store.stat("ghost.txt").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
