//! Integrity gate
//!
//! Keeps a SHA-256 digest per protected file and flags any divergence
//! from it. Records live as one file per protected path in a dedicated
//! directory, so independent server instances (and tests) each carry
//! their own gate instead of sharing process-wide state. Only `init`
//! rewrites a record; `has_changed` never does.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use sha2::{Digest, Sha256};

use crate::storage::FileStore;

const ALGORITHM: &str = "sha256";
const CHUNK_SIZE: usize = 512;

pub struct IntegrityGate {
    store: Arc<dyn FileStore>,
    records_dir: PathBuf,
}

impl IntegrityGate {
    pub fn new(store: Arc<dyn FileStore>, records_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            records_dir: records_dir.into(),
        }
    }

    /// Records the current digest of `name`, replacing any prior record.
    ///
    /// Called on first protection of a path and again after every
    /// successful upload of it.
    pub fn init(&self, name: &str) -> io::Result<()> {
        let digest = self.digest_hex(name)?;
        fs::create_dir_all(&self.records_dir)?;
        fs::write(self.record_path(name), format!("{ALGORITHM}:{digest}\n"))?;
        info!("integrity record initialized for {name}");
        Ok(())
    }

    /// Whether a record for `name` exists at all.
    pub fn has_record(&self, name: &str) -> bool {
        self.record_path(name).is_file()
    }

    /// Compares the current content of `name` against its record.
    ///
    /// No record means no verdict: the file is reported unchanged, with a
    /// gate-miss log line. A digest mismatch, or content that can no
    /// longer be hashed while a record exists, raises an alert and
    /// reports the file as changed. The record itself is left untouched.
    pub fn has_changed(&self, name: &str) -> bool {
        let record = match fs::read_to_string(self.record_path(name)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no integrity record for {name}; gate miss");
                return false;
            }
            Err(e) => {
                warn!("unreadable integrity record for {name}: {e}; gate miss");
                return false;
            }
        };

        let record = record.trim();
        let recorded = match record.split_once(':') {
            Some((algorithm, digest)) if algorithm == ALGORITHM => digest,
            _ => {
                error!("ALERT: integrity record for {name} uses an unknown algorithm");
                return true;
            }
        };

        match self.digest_hex(name) {
            Ok(current) if current == recorded => false,
            Ok(current) => {
                error!("ALERT: file {name} was changed ({recorded} -> {current})");
                true
            }
            Err(e) => {
                error!("ALERT: protected file {name} can no longer be hashed: {e}");
                true
            }
        }
    }

    /// Hex digest of the file's full content, streamed in fixed chunks.
    pub fn digest_hex(&self, name: &str) -> io::Result<String> {
        let mut reader = self.store.open_read(name)?;
        let mut hasher = Sha256::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.records_dir.join(record_key(name))
    }
}

/// Filesystem-safe record name for a protected path.
fn record_key(name: &str) -> String {
    let mut key: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    key.push_str(".sha256");
    key
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::storage::LocalFileStore;

    fn gate() -> (tempfile::TempDir, Arc<LocalFileStore>, IntegrityGate) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalFileStore::new(dir.path().join("data")).unwrap());
        let gate = IntegrityGate::new(store.clone(), dir.path().join("records"));
        (dir, store, gate)
    }

    fn write(store: &LocalFileStore, name: &str, content: &[u8]) {
        store.open_write(name).unwrap().write_all(content).unwrap();
    }

    #[test]
    fn unchanged_file_passes_the_gate() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"original content");
        gate.init("doc.txt").unwrap();
        assert!(gate.has_record("doc.txt"));
        assert!(!gate.has_changed("doc.txt"));
    }

    #[test]
    fn tampered_file_is_flagged() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"original content");
        gate.init("doc.txt").unwrap();
        write(&store, "doc.txt", b"tampered content");
        assert!(gate.has_changed("doc.txt"));
    }

    #[test]
    fn missing_record_is_a_gate_miss_not_a_flag() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"whatever");
        assert!(!gate.has_record("doc.txt"));
        assert!(!gate.has_changed("doc.txt"));
    }

    #[test]
    fn mismatch_does_not_rewrite_the_record() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"one");
        gate.init("doc.txt").unwrap();
        write(&store, "doc.txt", b"two");
        assert!(gate.has_changed("doc.txt"));
        // Still flagged on a second look: the record was not replaced.
        assert!(gate.has_changed("doc.txt"));
    }

    #[test]
    fn reinit_accepts_the_new_content() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"one");
        gate.init("doc.txt").unwrap();
        write(&store, "doc.txt", b"two");
        gate.init("doc.txt").unwrap();
        assert!(!gate.has_changed("doc.txt"));
    }

    #[test]
    fn deleted_protected_file_is_flagged() {
        let (_dir, store, gate) = gate();
        write(&store, "doc.txt", b"content");
        gate.init("doc.txt").unwrap();
        std::fs::remove_file(store.root().join("doc.txt")).unwrap();
        assert!(gate.has_changed("doc.txt"));
    }

    #[test]
    fn record_keys_are_filesystem_safe() {
        assert_eq!(record_key("doc.txt"), "doc.txt.sha256");
        assert_eq!(record_key("/sd/doc.txt"), "_sd_doc.txt.sha256");
        assert_eq!(record_key("a b:c"), "a_b_c.sha256");
    }

    #[test]
    fn record_carries_algorithm_and_hex_digest() {
        let (dir, store, gate) = gate();
        write(&store, "doc.txt", b"abc");
        gate.init("doc.txt").unwrap();
        let record = fs::read_to_string(dir.path().join("records/doc.txt.sha256")).unwrap();
        let (algo, digest) = record.trim().split_once(':').unwrap();
        assert_eq!(algo, "sha256");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
