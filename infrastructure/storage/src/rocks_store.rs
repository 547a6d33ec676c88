// Copyright 2024. The SQLChain Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::path::{Path, PathBuf};

use log::*;
use rocksdb::{DBCompressionType, Direction, IteratorMode, Options, DB};
use thiserror::Error;

const LOG_TARGET: &str = "storage::rocks_store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("RocksDB backend error: {0}")]
    Backend(#[from] rocksdb::Error),
}

/// An embedded key-value store. Values are compressed with snappy on disk. Writes are durable
/// once `put` returns; `close` flushes outstanding memtables and stops background work.
pub struct RocksStore {
    db: DB,
    path: PathBuf,
}

impl RocksStore {
    /// Opens (or creates) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(DBCompressionType::Snappy);
        let db = DB::open(&opts, path.as_ref())?;
        debug!(target: LOG_TARGET, "Opened store at {}", path.as_ref().display());
        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotent by key: writing the same key twice replaces the value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db.delete(key)?;
        Ok(())
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), StoreError>> + 'a {
        self.db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|entry| entry.map_err(StoreError::from))
            .take_while(move |entry| match entry {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => true,
            })
    }

    /// Flushes memtables and halts compaction. The store must not be used afterwards; the
    /// underlying handle is released on drop.
    pub fn close(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        self.db.cancel_all_background_work(true);
        debug!(target: LOG_TARGET, "Closed store at {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("kv")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, store) = open_temp();
        store.put(b"alpha", b"1").unwrap();
        assert_eq!(store.get(b"alpha").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(store.get(b"beta").unwrap(), None);
        // Same key replaces.
        store.put(b"alpha", b"2").unwrap();
        assert_eq!(store.get(b"alpha").unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn prefix_scan_is_key_ordered() {
        let (_dir, store) = open_temp();
        for i in [3u8, 0, 2, 1] {
            store.put(&[b'k', i], &[i]).unwrap();
        }
        store.put(b"other", b"x").unwrap();

        let keys: Vec<_> = store
            .iter_prefix(b"k")
            .map(|e| e.unwrap().0.to_vec())
            .collect();
        assert_eq!(keys, vec![b"k\x00".to_vec(), b"k\x01".to_vec(), b"k\x02".to_vec(), b"k\x03".to_vec()]);
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv");
        {
            let store = RocksStore::open(&path).unwrap();
            store.put(b"persist", b"yes").unwrap();
            store.close().unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        assert_eq!(store.get(b"persist").unwrap().as_deref(), Some(&b"yes"[..]));
    }
}
