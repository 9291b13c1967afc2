//! Brute-force in-memory vector store with checksummed snapshots.
//!
//! Snapshot layout: magic (4 bytes), version (u16 LE), blake3 digest of the payload
//! (32 bytes), then the bincode payload.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use atomic_write_file::AtomicWriteFile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Candidate, EmbeddedRecord, RecordFilter, StoredRecord, VectorStore};
use crate::constants::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::embed::cosine_similarity;
use crate::error::{ClaimtrailError, Result};

const HEADER_LEN: usize = 4 + 2 + 32;

/// `(document_id, record_id)`: record ids are only unique within a document.
type RecordKey = (String, String);

struct StoreInner<R> {
    dimension: Option<usize>,
    records: BTreeMap<RecordKey, EmbeddedRecord<R>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a, R> {
    dimension: Option<usize>,
    records: Vec<&'a EmbeddedRecord<R>>,
}

#[derive(Deserialize)]
struct Snapshot<R> {
    dimension: Option<usize>,
    records: Vec<EmbeddedRecord<R>>,
}

pub struct InMemoryVectorStore<R> {
    inner: RwLock<StoreInner<R>>,
}

impl<R> Default for InMemoryVectorStore<R> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                dimension: None,
                records: BTreeMap::new(),
            }),
        }
    }
}

impl<R: StoredRecord> InMemoryVectorStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Embedding dimension fixed by the first insert.
    pub fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dimension)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner<R>>> {
        self.inner
            .read()
            .map_err(|_| ClaimtrailError::unavailable("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner<R>>> {
        self.inner
            .write()
            .map_err(|_| ClaimtrailError::unavailable("store lock poisoned"))
    }

    fn check_dimensions(dimension: Option<usize>, records: &[EmbeddedRecord<R>]) -> Result<Option<usize>> {
        let mut expected = dimension;
        for record in records {
            let actual = record.embedding.len();
            match expected {
                Some(expected) if expected != actual => {
                    return Err(ClaimtrailError::DimensionMismatch { expected, actual });
                }
                Some(_) => {}
                None => expected = Some(actual),
            }
        }
        Ok(expected)
    }

    fn insert_all(inner: &mut StoreInner<R>, records: Vec<EmbeddedRecord<R>>) -> Result<usize> {
        inner.dimension = Self::check_dimensions(inner.dimension, &records)?;
        let written = records.len();
        for record in records {
            let key = (
                record.record.document_id().to_string(),
                record.record.record_id().to_string(),
            );
            inner.records.insert(key, record);
        }
        Ok(written)
    }

    fn remove_document(inner: &mut StoreInner<R>, document_id: &str) -> usize {
        let before = inner.records.len();
        inner
            .records
            .retain(|_, stored| stored.record.document_id() != document_id);
        before - inner.records.len()
    }
}

impl<R> InMemoryVectorStore<R>
where
    R: StoredRecord + Serialize + DeserializeOwned,
{
    /// Write a snapshot atomically; readers of `path` see the old file or the new one.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let payload = {
            let inner = self.read()?;
            let snapshot = SnapshotRef {
                dimension: inner.dimension,
                records: inner.records.values().collect(),
            };
            bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())?
        };
        let digest = blake3::hash(&payload);

        let mut file = AtomicWriteFile::open(path.as_ref())?;
        file.write_all(SNAPSHOT_MAGIC)?;
        file.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        file.write_all(digest.as_bytes())?;
        file.write_all(&payload)?;
        file.flush()?;
        file.commit()?;
        tracing::debug!(path = %path.as_ref().display(), bytes = payload.len(), "saved store snapshot");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs_err::read(path.as_ref())?;
        if bytes.len() < HEADER_LEN || &bytes[..4] != SNAPSHOT_MAGIC {
            return Err(ClaimtrailError::SnapshotCorrupt {
                reason: "missing snapshot header".into(),
            });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(ClaimtrailError::SnapshotCorrupt {
                reason: format!("unsupported snapshot version {version}"),
            });
        }
        let (digest, payload) = bytes[6..].split_at(32);
        if blake3::hash(payload).as_bytes() != digest {
            return Err(ClaimtrailError::SnapshotCorrupt {
                reason: "checksum mismatch".into(),
            });
        }
        let (snapshot, _): (Snapshot<R>, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

        let store = Self::new();
        {
            let mut inner = store.write()?;
            inner.dimension = snapshot.dimension;
            Self::insert_all(&mut inner, snapshot.records)?;
        }
        tracing::debug!(path = %path.as_ref().display(), "loaded store snapshot");
        Ok(store)
    }
}

impl<R: StoredRecord> VectorStore<R> for InMemoryVectorStore<R> {
    fn upsert(&self, records: Vec<EmbeddedRecord<R>>) -> Result<usize> {
        let mut inner = self.write()?;
        Self::insert_all(&mut inner, records)
    }

    fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut inner = self.write()?;
        Ok(Self::remove_document(&mut inner, document_id))
    }

    /// Delete and insert under one write lock, so readers never see a partial document.
    fn replace_document(&self, document_id: &str, records: Vec<EmbeddedRecord<R>>) -> Result<usize> {
        let mut inner = self.write()?;
        // Validate before deleting so a bad batch leaves the old document in place.
        let only_this_document = inner
            .records
            .values()
            .all(|stored| stored.record.document_id() == document_id);
        let remaining_dimension = if only_this_document {
            None
        } else {
            inner.dimension
        };
        Self::check_dimensions(remaining_dimension, &records)?;
        let removed = Self::remove_document(&mut inner, document_id);
        if inner.records.is_empty() {
            inner.dimension = None;
        }
        let written = Self::insert_all(&mut inner, records)?;
        tracing::debug!(document_id, removed, written, "replaced document records");
        Ok(written)
    }

    fn search(&self, query: &[f32], filter: &RecordFilter, top_n: usize) -> Result<Vec<Candidate<R>>> {
        let inner = self.read()?;
        if let Some(expected) = inner.dimension {
            if expected != query.len() {
                return Err(ClaimtrailError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        let mut scored: Vec<(&RecordKey, Candidate<R>)> = inner
            .records
            .iter()
            .filter(|(_, stored)| stored.record.matches(filter))
            .map(|(key, stored)| {
                (
                    key,
                    Candidate {
                        record: stored.record.clone(),
                        score: cosine_similarity(query, &stored.embedding),
                    },
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.score
                .total_cmp(&a.1.score)
                .then_with(|| a.0.1.cmp(&b.0.1))
                .then_with(|| a.0.0.cmp(&b.0.0))
        });
        scored.truncate(top_n);
        Ok(scored.into_iter().map(|(_, candidate)| candidate).collect())
    }

    fn fetch(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<R>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .values()
            .filter(|stored| stored.record.matches(filter))
            .take(limit)
            .map(|stored| stored.record.clone())
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }
}
