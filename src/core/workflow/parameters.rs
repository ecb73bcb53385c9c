//! Handle-addressed parameter groups.

use crate::core::workflow::encoding::{self, EncodedValue};
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::store::{StoredGroup, WorkflowStore};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use tracing::debug;

/// In-memory allocation state of one workflow's parameter groups.
///
/// Seeded once from the store when the workflow is opened; afterwards handle
/// allocation and the pending bookkeeping never list or read the store.
#[derive(Debug, Default)]
pub struct HandleLedger {
    next: Cell<usize>,
    /// Groups whose stored `is_pending_add` flag is still set.
    pending: RefCell<BTreeSet<usize>>,
    /// Groups written since the last commit, promoted or not.
    uncommitted: RefCell<BTreeSet<usize>>,
}

impl HandleLedger {
    /// Groups still flagged pending belong to a batch that never committed.
    pub fn scan(store: &dyn WorkflowStore) -> Result<Self, WorkflowError> {
        let handles = store.parameter_handles()?;
        let mut pending = BTreeSet::new();
        for &handle in &handles {
            if let Some(group) = store.read_parameter_group(handle)? {
                if group.is_pending_add {
                    pending.insert(handle);
                }
            }
        }
        Ok(HandleLedger {
            next: Cell::new(handles.last().map_or(0, |max| max + 1)),
            uncommitted: RefCell::new(pending.clone()),
            pending: RefCell::new(pending),
        })
    }

    pub fn next_handle(&self) -> usize {
        self.next.get()
    }
}

/// Borrowed view over the parameter-group sub-store of one workflow.
pub struct ParameterStore<'a> {
    store: &'a dyn WorkflowStore,
    ledger: &'a HandleLedger,
    array_extract_threshold: usize,
}

impl<'a> ParameterStore<'a> {
    pub fn new(
        store: &'a dyn WorkflowStore,
        ledger: &'a HandleLedger,
        array_extract_threshold: usize,
    ) -> Self {
        ParameterStore {
            store,
            ledger,
            array_extract_threshold,
        }
    }

    /// Persist `value` under the next unused handle.
    pub fn create(&self, value: &Value, pending: bool, is_set: bool) -> Result<usize, WorkflowError> {
        // Another writer may have committed groups since the ledger was seeded.
        let mut handle = self.ledger.next.get();
        while self.store.has_parameter_group(handle)? {
            handle += 1;
        }
        let (encoded, children) = encoding::encode(value, self.array_extract_threshold);
        let group = StoredGroup {
            value: encoded,
            is_set,
            is_pending_add: pending,
        };
        self.ledger.next.set(handle + 1);
        if pending {
            self.ledger.pending.borrow_mut().insert(handle);
            self.ledger.uncommitted.borrow_mut().insert(handle);
        }
        self.store.write_parameter_group(handle, &group, &children)?;
        debug!(
            handle,
            pending,
            is_set,
            extracted = children.len(),
            "allocated parameter group"
        );
        Ok(handle)
    }

    /// Reserve an unset placeholder, as used for element outputs.
    pub fn reserve(&self, pending: bool) -> Result<usize, WorkflowError> {
        self.create(&Value::Null, pending, false)
    }

    fn group(&self, handle: usize) -> Result<StoredGroup, WorkflowError> {
        self.store
            .read_parameter_group(handle)?
            .ok_or(WorkflowError::MissingParameterGroup(handle))
    }

    /// Decode the full value tree of a group.
    pub fn read(&self, handle: usize) -> Result<Value, WorkflowError> {
        let group = self.group(handle)?;
        self.decode(handle, &group.value)
    }

    fn decode(&self, handle: usize, value: &EncodedValue) -> Result<Value, WorkflowError> {
        encoding::decode(value, |array| {
            self.store.read_parameter_child(handle, &array.child)
        })
    }

    pub fn is_set(&self, handle: usize) -> Result<bool, WorkflowError> {
        Ok(self.group(handle)?.is_set)
    }

    pub fn is_pending(&self, handle: usize) -> Result<bool, WorkflowError> {
        Ok(self.group(handle)?.is_pending_add)
    }

    pub fn exists(&self, handle: usize) -> Result<bool, WorkflowError> {
        self.store.has_parameter_group(handle)
    }

    pub fn exists_many(&self, handles: &[usize]) -> Result<Vec<bool>, WorkflowError> {
        let known = self.store.parameter_handles()?;
        Ok(handles
            .iter()
            .map(|handle| known.binary_search(handle).is_ok())
            .collect())
    }

    pub fn handles(&self) -> Result<Vec<usize>, WorkflowError> {
        self.store.parameter_handles()
    }

    pub fn len(&self) -> Result<usize, WorkflowError> {
        Ok(self.store.parameter_handles()?.len())
    }

    /// Handles of every group still flagged `is_pending_add`.
    pub fn pending_handles(&self) -> Vec<usize> {
        self.ledger.pending.borrow().iter().copied().collect()
    }

    /// Handles written since the last [`ParameterStore::mark_committed`].
    pub fn uncommitted_handles(&self) -> Vec<usize> {
        self.ledger.uncommitted.borrow().iter().copied().collect()
    }

    /// Clear the pending flag on every pending group. Returns the promoted
    /// handles. A failed call can be repeated; it resumes where it stopped.
    pub fn promote_pending(&self) -> Result<Vec<usize>, WorkflowError> {
        let pending = self.pending_handles();
        for &handle in &pending {
            let mut group = self.group(handle)?;
            group.is_pending_add = false;
            self.store.update_parameter_group(handle, &group)?;
            self.ledger.pending.borrow_mut().remove(&handle);
        }
        if !pending.is_empty() {
            debug!(count = pending.len(), "promoted pending parameter groups");
        }
        Ok(pending)
    }

    /// The metadata referencing every uncommitted group is durable.
    pub fn mark_committed(&self) {
        self.ledger.uncommitted.borrow_mut().clear();
    }

    /// Delete every group written since the last commit, promoted or not.
    /// Returns the removed handles. Safe to repeat after a partial failure.
    pub fn discard_uncommitted(&self) -> Result<Vec<usize>, WorkflowError> {
        let uncommitted = self.uncommitted_handles();
        for &handle in &uncommitted {
            self.store.remove_parameter_group(handle)?;
            self.ledger.uncommitted.borrow_mut().remove(&handle);
            self.ledger.pending.borrow_mut().remove(&handle);
        }
        if let Some(&first) = uncommitted.first() {
            if first < self.ledger.next.get() {
                self.ledger.next.set(first);
            }
            debug!(count = uncommitted.len(), "discarded uncommitted parameter groups");
        }
        Ok(uncommitted)
    }
}
