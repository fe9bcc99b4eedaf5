use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use sled::{Db, Tree};
use thiserror::Error;

use crate::lifecycle::SetupState;
use crate::product::Product;

/// Tree holding the setup ledger; no table may use this name.
pub const SETUP_TREE: &str = "__setup__";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Record has no productId")]
    MissingKey,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Table name {0:?} is reserved")]
    ReservedTable(String),
}

/// Sequence of stored records. Order is unspecified. `SledStore` reads
/// lazily; `MemoryStore` iterates over a snapshot taken when the scan starts.
pub type ProductScan<'a> = Box<dyn Iterator<Item = Result<Product, StoreError>> + 'a>;

/// Key-value table of product records keyed by `productId`.
///
/// Implementations are shared between concurrent handlers, so every method
/// takes `&self`. Writes to the same key are last-write-wins.
pub trait RecordStore: Send + Sync {
    /// Inserts or overwrites the record stored under `record.product_id`.
    fn put(&self, record: &Product) -> Result<(), StoreError>;

    /// Returns the record for `product_id`, or `None` if there is none.
    fn get(&self, product_id: &str) -> Result<Option<Product>, StoreError>;

    /// Iterates every stored record.
    fn scan_all(&self) -> Result<ProductScan<'_>, StoreError>;
}

/// Persists where the one-shot setup lifecycle currently stands.
pub trait SetupLedger: Send + Sync {
    fn load(&self) -> Result<SetupState, StoreError>;
    fn save(&self, state: SetupState) -> Result<(), StoreError>;

    /// Atomically moves the state from `from` to `to`. Returns `false`,
    /// leaving the state untouched, when it was not `from`.
    fn transition(&self, from: SetupState, to: SetupState) -> Result<bool, StoreError>;
}

/// sled-backed table. Each table name maps to its own tree, so several
/// tables can share one database directory.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    records: Tree,
    setup: Tree,
    table: String,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(db, table)
    }

    /// Throwaway database that lives only as long as the handle.
    pub fn temporary(table: &str) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, table)
    }

    fn with_db(db: Db, table: &str) -> Result<Self, StoreError> {
        if table == SETUP_TREE {
            return Err(StoreError::ReservedTable(table.to_string()));
        }
        let records = db.open_tree(table)?;
        let setup = db.open_tree(SETUP_TREE)?;
        Ok(Self {
            db,
            records,
            setup,
            table: table.to_string(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn setup_key(&self) -> String {
        format!("setup:{}", self.table)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn put(&self, record: &Product) -> Result<(), StoreError> {
        if record.product_id.is_empty() {
            return Err(StoreError::MissingKey);
        }
        let serialized = serde_json::to_vec(record)?;
        self.records.insert(record.product_id.as_bytes(), serialized)?;
        self.records.flush()?;
        Ok(())
    }

    fn get(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        match self.records.get(product_id.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn scan_all(&self) -> Result<ProductScan<'_>, StoreError> {
        Ok(Box::new(self.records.iter().map(|entry| -> Result<Product, StoreError> {
            let (_, data) = entry?;
            Ok(serde_json::from_slice(&data)?)
        })))
    }
}

impl SetupLedger for SledStore {
    fn load(&self) -> Result<SetupState, StoreError> {
        match self.setup.get(self.setup_key().as_bytes())? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(SetupState::default()),
        }
    }

    fn save(&self, state: SetupState) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec(&state)?;
        self.setup.insert(self.setup_key().as_bytes(), serialized)?;
        self.setup.flush()?;
        Ok(())
    }

    fn transition(&self, from: SetupState, to: SetupState) -> Result<bool, StoreError> {
        let key = self.setup_key();
        let current = self.setup.get(key.as_bytes())?;
        let state = match &current {
            Some(data) => serde_json::from_slice(data)?,
            None => SetupState::default(),
        };
        if state != from {
            return Ok(false);
        }
        let next = serde_json::to_vec(&to)?;
        // Swaps only if the bytes just read are still there.
        if self.setup.compare_and_swap(key.as_bytes(), current, Some(next))?.is_err() {
            return Ok(false);
        }
        self.setup.flush()?;
        Ok(true)
    }
}

/// In-process table for tests and demos. `set_offline(true)` makes every
/// call fail the way an unreachable backend would.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Product>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl RecordStore for MemoryStore {
    fn put(&self, record: &Product) -> Result<(), StoreError> {
        self.check_online()?;
        if record.product_id.is_empty() {
            return Err(StoreError::MissingKey);
        }
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(record.product_id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        self.check_online()?;
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(product_id).cloned())
    }

    fn scan_all(&self) -> Result<ProductScan<'_>, StoreError> {
        self.check_online()?;
        // Snapshot so the lock is not held while the caller iterates.
        let rows: Vec<Product> = self.records.read().map_err(poisoned)?.values().cloned().collect();
        Ok(Box::new(rows.into_iter().map(Ok::<Product, StoreError>)))
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<SetupState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SetupLedger for MemoryLedger {
    fn load(&self) -> Result<SetupState, StoreError> {
        Ok(*self.state.read().map_err(poisoned)?)
    }

    fn save(&self, state: SetupState) -> Result<(), StoreError> {
        *self.state.write().map_err(poisoned)? = state;
        Ok(())
    }

    fn transition(&self, from: SetupState, to: SetupState) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if *state != from {
            return Ok(false);
        }
        *state = to;
        Ok(true)
    }
}
