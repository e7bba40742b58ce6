// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Durable work-list of transfers.
//!
//! Every transition is persisted before the next remote call, so a
//! restarted tracker resumes in-flight transfers from where they were.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::transfer::{Transfer, TransferId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode/decode transfers: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transfer store lock is poisoned")]
    Poisoned,
}

pub trait TransferStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Transfer>, StoreError>;

    fn get(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError>;

    /// Inserts or replaces the transfers, atomically.
    fn put_all(&self, transfers: &[Transfer]) -> Result<(), StoreError>;

    fn put(&self, transfer: &Transfer) -> Result<(), StoreError> {
        self.put_all(std::slice::from_ref(transfer))
    }

    /// Transfers that have not reached a terminal state.
    fn pending(&self) -> Result<Vec<Transfer>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|transfer| !transfer.is_completed())
            .collect())
    }
}

impl<T: TransferStore + ?Sized> TransferStore for Arc<T> {
    fn load_all(&self) -> Result<Vec<Transfer>, StoreError> {
        (**self).load_all()
    }

    fn get(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        (**self).get(id)
    }

    fn put_all(&self, transfers: &[Transfer]) -> Result<(), StoreError> {
        (**self).put_all(transfers)
    }
}

type Transfers = BTreeMap<TransferId, Transfer>;

fn lock(transfers: &Mutex<Transfers>) -> Result<MutexGuard<'_, Transfers>, StoreError> {
    transfers.lock().map_err(|_| StoreError::Poisoned)
}

fn insert(transfers: &mut Transfers, batch: &[Transfer]) {
    for transfer in batch {
        transfers.insert(transfer.id(), transfer.clone());
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    transfers: Mutex<Transfers>,
}

impl TransferStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Transfer>, StoreError> {
        Ok(lock(&self.transfers)?.values().cloned().collect())
    }

    fn get(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(lock(&self.transfers)?.get(id).cloned())
    }

    fn put_all(&self, transfers: &[Transfer]) -> Result<(), StoreError> {
        insert(&mut *lock(&self.transfers)?, transfers);
        Ok(())
    }
}

/// JSON file rewritten as a whole on every update (temp file + rename).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    transfers: Mutex<Transfers>,
}

impl JsonFileStore {
    /// Opens the store, an absent file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut transfers = Transfers::new();
        if path.exists() {
            let raw = std::fs::read(&path)?;
            let saved: Vec<Transfer> = serde_json::from_slice(&raw)?;
            debug!("Loaded {} transfers from {}", saved.len(), path.display());
            insert(&mut transfers, &saved);
        }
        Ok(Self {
            path,
            transfers: Mutex::new(transfers),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, transfers: &Transfers) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            let values: Vec<&Transfer> = transfers.values().collect();
            file.write_all(&serde_json::to_vec_pretty(&values)?)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl TransferStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Transfer>, StoreError> {
        Ok(lock(&self.transfers)?.values().cloned().collect())
    }

    fn get(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(lock(&self.transfers)?.get(id).cloned())
    }

    fn put_all(&self, transfers: &[Transfer]) -> Result<(), StoreError> {
        let mut guard = lock(&self.transfers)?;
        let mut updated = guard.clone();
        insert(&mut updated, transfers);
        // memory is only updated once the file is
        self.save(&updated)?;
        *guard = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fa_bridge_types::{Address, HexString, TicketHash};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ledger::{BatchOrderingKey, OperationHash};
    use crate::outbox::OutboxMessageRef;
    use crate::transfer::TransferKind;

    fn withdrawal(log_index: u64) -> Transfer {
        Transfer::created(
            TransferKind::Withdrawal,
            OperationHash::from("0xabcd"),
            BatchOrderingKey::L2 {
                transaction_index: 3,
                log_index,
            },
            Address::new("0x1111111111111111111111111111111111111111"),
            Address::new("tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU"),
            TicketHash::default(),
            5.into(),
            HexString(vec![0u8; 44]),
        )
    }

    #[test]
    fn memory_store_pending() {
        let store = MemoryStore::default();
        let mut done = withdrawal(1);
        done.observe_withdrawal(OutboxMessageRef { level: 1, index: 0 })
            .unwrap();
        done.mark_cemented().unwrap();
        done.attach_proof(crate::outbox::OutboxProof {
            commitment: crate::outbox::CommitmentHash("src1".into()),
            proof: HexString(vec![1]),
        })
        .unwrap();
        done.complete_withdrawal("oo1".into()).unwrap();

        store.put_all(&[withdrawal(0), done]).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
        assert_eq!(store.pending().unwrap(), vec![withdrawal(0)]);
    }

    #[test]
    fn file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.json");

        let mut transfer = withdrawal(0);
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert!(store.load_all().unwrap().is_empty());
            store.put(&transfer).unwrap();

            transfer
                .observe_withdrawal(OutboxMessageRef { level: 9, index: 2 })
                .unwrap();
            store.put(&transfer).unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(&transfer.id()).unwrap(), Some(transfer.clone()));
        assert_eq!(store.load_all().unwrap().len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }
}
