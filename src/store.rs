//! Durable sample store backed by sled.
//!
//! Layout inside the `samples` tree:
//! - `sample/<id>`: JSON-encoded [`Sample`], `id` from sled's monotonic generator (big-endian,
//!   so iteration follows insertion order).
//! - `count/<label>`: big-endian `u64` number of stored samples carrying that label.
//!
//! The store only grows by [`SampleStore::append`] and only shrinks by [`SampleStore::clear`].

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::normalize::Sequence;
use crate::sample::{epoch_millis, Sample};

const SAMPLES_TREE: &str = "samples";
const SAMPLE_PREFIX: &[u8] = b"sample/";
const COUNT_PREFIX: &[u8] = b"count/";

fn sample_key(id: u64) -> Vec<u8> {
    let mut key = SAMPLE_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn count_key(label: &str) -> Vec<u8> {
    let mut key = COUNT_PREFIX.to_vec();
    key.extend_from_slice(label.as_bytes());
    key
}

fn decode_count(raw: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("label counter has {} bytes", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Append-only keyed storage of labeled sequences.
///
/// Cloning is cheap; clones share the same underlying database.
#[derive(Clone)]
pub struct SampleStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("tree", &SAMPLES_TREE)
            .field("entries", &self.tree.len())
            .finish()
    }
}

impl SampleStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a store from an already-open sled handle.
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(SAMPLES_TREE)?;
        Ok(Self { db, tree })
    }

    /// Persists a new sample for `label` and returns it.
    ///
    /// The ordinal is `count_by_label(label) + 1`, read and bumped inside the same
    /// transaction that writes the record. The data is flushed before this returns, so
    /// completion means commit. On error nothing is written, except for
    /// [`StorageError::NotDurable`]: the sample is then already committed and counted, only
    /// the flush to disk failed.
    #[instrument(skip(self, frames))]
    pub async fn append(&self, label: &str, frames: Sequence) -> Result<Sample, StorageError> {
        if label.is_empty() {
            return Err(StorageError::Invalid("label must not be empty".to_string()));
        }

        let created_at = epoch_millis();
        let counter = count_key(label);

        let sample = self
            .tree
            .transaction(|tx| -> ConflictableTransactionResult<Sample, StorageError> {
                let count = match tx.get(&counter)? {
                    Some(raw) => decode_count(&raw).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                let ordinal = count + 1;
                let id = tx.generate_id()?;

                let sample = Sample::new(label, created_at, frames.clone(), ordinal);
                let value = serde_json::to_vec(&sample)
                    .map_err(|e| ConflictableTransactionError::Abort(StorageError::Codec(e)))?;

                tx.insert(sample_key(id), value)?;
                tx.insert(counter.clone(), &ordinal.to_be_bytes()[..])?;
                Ok(sample)
            })?;

        if let Err(source) = self.db.flush_async().await {
            warn!(filename = %sample.filename, error = %source, "sample committed but flush failed");
            return Err(StorageError::NotDurable {
                filename: sample.filename,
                source,
            });
        }
        debug!(filename = %sample.filename, "sample committed");
        Ok(sample)
    }

    /// Number of stored samples whose label equals `label` exactly (case-sensitive).
    pub fn count_by_label(&self, label: &str) -> Result<u64, StorageError> {
        match self.tree.get(count_key(label))? {
            Some(raw) => decode_count(&raw),
            None => Ok(0),
        }
    }

    /// Every stored sample, in insertion order.
    ///
    /// Records that no longer decode are logged and skipped so one bad entry cannot make
    /// the whole dataset unreadable. Database errors still fail the call.
    pub fn all(&self) -> Result<Vec<Sample>, StorageError> {
        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for entry in self.tree.scan_prefix(SAMPLE_PREFIX) {
            let (key, value) = entry?;
            match serde_json::from_slice::<Sample>(&value) {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    skipped += 1;
                    warn!(key = ?key, error = %err, "skipping undecodable sample record");
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, kept = samples.len(), "sample scan skipped bad records");
        }
        Ok(samples)
    }

    /// Total number of stored samples.
    pub fn len(&self) -> Result<usize, StorageError> {
        let mut n = 0;
        for key in self.tree.scan_prefix(SAMPLE_PREFIX).keys() {
            key?;
            n += 1;
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.tree.scan_prefix(SAMPLE_PREFIX).next().transpose()?.is_none())
    }

    /// Deletes every sample and every label counter in one atomic batch.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for key in self.tree.iter().keys() {
            let key = key?;
            if key.starts_with(SAMPLE_PREFIX) {
                removed += 1;
            }
            batch.remove(key);
        }

        self.tree.apply_batch(batch)?;
        self.db.flush_async().await?;
        info!(removed, "sample store cleared");
        Ok(())
    }
}
