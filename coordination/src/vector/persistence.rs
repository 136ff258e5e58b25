//! Optional RocksDB-backed persistence mirror for the vector store,
//! gated behind the `persistence` feature. Grounded on the teacher's
//! `state/store.rs` column-family-per-concern pattern, trimmed to a
//! single column family since the vector store has one entity kind.

#![cfg(feature = "persistence")]

use std::path::PathBuf;
use std::sync::RwLock;

use rocksdb::{Options, DB};

use super::types::VectorEntry;
use crate::error::{CoreError, CoreResult};
use crate::ids::VectorId;

const CF_VECTORS: &str = "vectors";

pub struct VectorPersistence {
    db: RwLock<DB>,
}

impl VectorPersistence {
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf = rocksdb::ColumnFamilyDescriptor::new(CF_VECTORS, Options::default());
        let db = DB::open_cf_descriptors(&opts, &path, vec![cf])
            .map_err(|e| CoreError::Internal(format!("rocksdb open failed: {e}")))?;

        Ok(Self { db: RwLock::new(db) })
    }

    pub fn put(&self, entry: &VectorEntry) -> CoreResult<()> {
        let db = self
            .db
            .read()
            .map_err(|_| CoreError::Internal("vector persistence lock poisoned".into()))?;
        let cf = db
            .cf_handle(CF_VECTORS)
            .ok_or_else(|| CoreError::Internal("vectors column family missing".into()))?;
        let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| CoreError::Internal(format!("vector encode failed: {e}")))?;
        db.put_cf(&cf, entry.id.as_str().as_bytes(), bytes)
            .map_err(|e| CoreError::Internal(format!("rocksdb put failed: {e}")))?;
        Ok(())
    }

    pub fn delete(&self, id: &VectorId) -> CoreResult<()> {
        let db = self
            .db
            .read()
            .map_err(|_| CoreError::Internal("vector persistence lock poisoned".into()))?;
        let cf = db
            .cf_handle(CF_VECTORS)
            .ok_or_else(|| CoreError::Internal("vectors column family missing".into()))?;
        db.delete_cf(&cf, id.as_str().as_bytes())
            .map_err(|e| CoreError::Internal(format!("rocksdb delete failed: {e}")))?;
        Ok(())
    }

    /// Load every persisted entry, used to repopulate the in-memory map
    /// on startup.
    pub fn load_all(&self) -> CoreResult<Vec<VectorEntry>> {
        let db = self
            .db
            .read()
            .map_err(|_| CoreError::Internal("vector persistence lock poisoned".into()))?;
        let cf = db
            .cf_handle(CF_VECTORS)
            .ok_or_else(|| CoreError::Internal("vectors column family missing".into()))?;

        let mut out = Vec::new();
        for item in db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, bytes) = item.map_err(|e| CoreError::Internal(format!("rocksdb iter failed: {e}")))?;
            let (entry, _): (VectorEntry, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|e| CoreError::Internal(format!("vector decode failed: {e}")))?;
            out.push(entry);
        }
        Ok(out)
    }
}
