//! Transaction state.

use crate::error::{CoreError, CoreResult};
use entiscope_store::{Datastore, TxnHandle};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// A native store transaction plus its commit listeners.
///
/// Listeners run only after a confirmed commit, in registration order.
pub struct Transaction {
    handle: TxnHandle,
    store: Arc<dyn Datastore>,
    state: Cell<TransactionState>,
    listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Transaction {
    /// Begins a native transaction on `store`.
    pub(crate) fn begin(store: Arc<dyn Datastore>) -> CoreResult<Self> {
        let handle = store.begin_transaction()?;
        Ok(Self {
            handle,
            store,
            state: Cell::new(TransactionState::Active),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Returns the native handle.
    #[must_use]
    pub fn handle(&self) -> TxnHandle {
        self.handle
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.get() == TransactionState::Active
    }

    /// Registers `listener` to run after a successful commit.
    pub fn listen_for_commit(&self, listener: impl FnOnce() + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Commits. A failed commit leaves the transaction active so that it
    /// can be rolled back.
    pub(crate) fn commit(&self) -> CoreResult<()> {
        self.ensure_active()?;
        self.store.commit(self.handle)?;
        self.state.set(TransactionState::Committed);
        Ok(())
    }

    /// Rolls back. The transaction counts as rolled back even if the store
    /// call fails.
    pub(crate) fn rollback(&self) -> CoreResult<()> {
        self.ensure_active()?;
        self.state.set(TransactionState::RolledBack);
        self.store.rollback(self.handle)?;
        Ok(())
    }

    /// Runs and forgets the commit listeners.
    pub(crate) fn run_commit_listeners(&self) {
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state.get() {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::RolledBack => {
                Err(CoreError::invalid_operation("transaction already rolled back"))
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("handle", &self.handle)
            .field("state", &self.state.get())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
