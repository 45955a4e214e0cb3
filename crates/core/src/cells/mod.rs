//! Reactive cell store.
//!
//! Cells are created once and then only reassigned for the lifetime of the
//! owning namespace. Both execution contexts touch the store, so each cell
//! sits behind its own short-lived lock: a reader never sees a partial write,
//! but there is no transaction spanning several cells.
//!
//! Plain writes are last-write-wins. Every write bumps a per-cell version so a
//! writer that must not clobber a concurrent update can use
//! [`CellStore::compare_and_write`] instead.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{Mutex, RwLock};

use crate::Value;

#[derive(Debug)]
struct Slot {
    value: Value,
    version: u64,
}

/// Outcome of [`CellStore::compare_and_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Written { version: u64 },
    Stale { current: u64 },
    Missing,
}

#[derive(Debug, Default)]
pub struct CellStore {
    namespace: String,
    cells: RwLock<BTreeMap<String, Arc<Mutex<Slot>>>>,
}

impl CellStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cells: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Registers a cell. Returns `false` and leaves the existing value alone
    /// when the id is already taken.
    pub fn create(&self, id: impl Into<String>, initial: Value) -> bool {
        let id = id.into();
        let mut cells = self.cells.write();
        if cells.contains_key(&id) {
            return false;
        }
        tracing::debug!(namespace = %self.namespace, cell = %id, value = %initial, "cell created");
        cells.insert(
            id,
            Arc::new(Mutex::new(Slot {
                value: initial,
                version: 0,
            })),
        );
        true
    }

    pub fn read(&self, id: &str) -> Option<Value> {
        self.slot(id).map(|slot| slot.lock().value.clone())
    }

    /// Numeric read for arithmetic. Unknown cells read as 0.
    pub fn read_number(&self, id: &str) -> f64 {
        self.read(id).map(|value| value.as_number()).unwrap_or(0.0)
    }

    pub fn version(&self, id: &str) -> Option<u64> {
        self.slot(id).map(|slot| slot.lock().version)
    }

    /// Replaces the value of an existing cell and returns its new version.
    /// Unknown ids are a no-op.
    pub fn write(&self, id: &str, value: Value) -> Option<u64> {
        self.update(id, |_| value)
    }

    /// Read-modify-write of a single cell under its lock.
    pub fn update(&self, id: &str, f: impl FnOnce(&Value) -> Value) -> Option<u64> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        slot.value = f(&slot.value);
        slot.version += 1;
        Some(slot.version)
    }

    pub fn compare_and_write(&self, id: &str, expected_version: u64, value: Value) -> CasOutcome {
        let Some(slot) = self.slot(id) else {
            return CasOutcome::Missing;
        };
        let mut slot = slot.lock();
        if slot.version != expected_version {
            return CasOutcome::Stale {
                current: slot.version,
            };
        }
        slot.value = value;
        slot.version += 1;
        CasOutcome::Written {
            version: slot.version,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cells.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every cell value, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.cells
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.lock().value.clone()))
            .collect()
    }

    fn slot(&self, id: &str) -> Option<Arc<Mutex<Slot>>> {
        self.cells.read().get(id).cloned()
    }
}
