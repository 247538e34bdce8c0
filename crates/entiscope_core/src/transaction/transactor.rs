//! Transaction propagation and the optimistic-concurrency retry loop.

use super::state::Transaction;
use crate::deferrer::Deferrer;
use crate::error::{CoreError, CoreResult};
use crate::pending::PendingCompletions;
use crate::scope::Scope;
use crate::session::Session;
use entiscope_store::TxnHandle;
use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// How a unit of work relates to the caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Requires an active transaction; fails without one.
    Mandatory,
    /// Forbids an active transaction; fails with one.
    Never,
    /// Runs outside any transaction, suspending an active one.
    NotSupported,
    /// Runs outside any transaction, suspending an active one.
    Supports,
    /// Joins the active transaction or starts a new one.
    Required,
    /// Always starts a new transaction, suspending an active one.
    RequiresNew,
}

/// How many attempts a transaction gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryLimit {
    /// Retry conflicts forever.
    Unbounded,
    /// At most this many attempts in total.
    Attempts(NonZeroU32),
}

impl RetryLimit {
    fn allows_another(self, attempts_made: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Attempts(limit) => attempts_made < limit.get(),
        }
    }
}

/// Owner of a scope's session, deferred writes and pending results, plus
/// the transaction if the scope is transactional.
pub(crate) struct Transactor {
    session: Rc<RefCell<Session>>,
    deferrer: RefCell<Deferrer>,
    pending: RefCell<PendingCompletions>,
    transaction: Option<Rc<Transaction>>,
    parent: Option<Rc<Transactor>>,
}

impl Transactor {
    /// A transactor without a transaction and with a fresh session.
    pub(crate) fn root() -> Self {
        Self {
            session: Rc::new(RefCell::new(Session::new())),
            deferrer: RefCell::new(Deferrer::new()),
            pending: RefCell::new(PendingCompletions::default()),
            transaction: None,
            parent: None,
        }
    }

    /// A transactor for one attempt of `transaction`, nested under `parent`.
    ///
    /// On commit the attempt's session is merged into the parent's.
    fn transactional(transaction: Rc<Transaction>, parent: Rc<Transactor>) -> Self {
        let session = Rc::new(RefCell::new(Session::new()));
        let child = Rc::clone(&session);
        let parent_session = Rc::clone(&parent.session);
        transaction.listen_for_commit(move || {
            parent_session.borrow_mut().add_all(&child.borrow());
        });
        Self {
            session,
            deferrer: RefCell::new(Deferrer::new()),
            pending: RefCell::new(PendingCompletions::default()),
            transaction: Some(transaction),
            parent: Some(parent),
        }
    }

    pub(crate) fn session(&self) -> &Rc<RefCell<Session>> {
        &self.session
    }

    pub(crate) fn deferrer(&self) -> &RefCell<Deferrer> {
        &self.deferrer
    }

    pub(crate) fn pending(&self) -> &RefCell<PendingCompletions> {
        &self.pending
    }

    pub(crate) fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_deref()
    }

    pub(crate) fn handle(&self) -> Option<TxnHandle> {
        self.transaction.as_ref().map(|t| t.handle())
    }

    pub(crate) fn drain_pending(&self) -> CoreResult<()> {
        self.pending.borrow_mut().drain()
    }

    pub(crate) fn execute<R>(
        &self,
        scope: &Scope,
        propagation: Propagation,
        mut work: impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let active = self.transaction.is_some();
        match (propagation, active) {
            (Propagation::Mandatory, false) => Err(CoreError::NoTransaction),
            (Propagation::Never, true) => Err(CoreError::TransactionPresent),
            (Propagation::Mandatory | Propagation::Required, true) => work(scope),
            (Propagation::Never | Propagation::NotSupported | Propagation::Supports, false) => {
                work(scope)
            }
            (Propagation::NotSupported | Propagation::Supports, true) => {
                self.transactionless(scope, work)
            }
            (Propagation::Required, false) | (Propagation::RequiresNew, _) => {
                self.run(scope, RetryLimit::Unbounded, work)
            }
        }
    }

    pub(crate) fn transact_new<R>(
        &self,
        scope: &Scope,
        max_attempts: u32,
        work: impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let limit = NonZeroU32::new(max_attempts).ok_or_else(|| {
            CoreError::programming("a transaction needs at least one attempt")
        })?;
        self.run(scope, RetryLimit::Attempts(limit), work)
    }

    /// Runs `work` in the nearest enclosing scope that has no transaction.
    pub(crate) fn transactionless<R>(
        &self,
        scope: &Scope,
        work: impl FnOnce(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        if self.transaction.is_none() {
            return work(scope);
        }
        let mut current = self.parent.clone();
        while let Some(transactor) = current {
            if transactor.transaction.is_none() {
                return work(&scope.with_transactor(transactor));
            }
            current = transactor.parent.clone();
        }
        Err(CoreError::invalid_operation(
            "transactional scope has no transactionless ancestor",
        ))
    }

    fn run<R>(
        &self,
        scope: &Scope,
        limit: RetryLimit,
        mut work: impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.transact_once(scope, &mut work) {
                Err(err) if err.is_concurrent_modification() && limit.allows_another(attempts) => {
                    warn!(attempt = attempts, error = %err, "optimistic concurrency failure, retrying");
                }
                result => return result,
            }
        }
    }

    /// One attempt: fresh transactional scope, work, flush, commit.
    fn transact_once<R>(
        &self,
        scope: &Scope,
        work: &mut impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let transaction = Rc::new(Transaction::begin(Arc::clone(scope.factory().store()))?);
        let transactor = Rc::new(Transactor::transactional(
            Rc::clone(&transaction),
            Rc::clone(scope.transactor()),
        ));
        let txn_scope = scope.with_transactor(Rc::clone(&transactor));
        trace!(txn = %transaction.handle(), "transaction started");

        let guard = AttemptGuard {
            transaction: &transaction,
            transactor: &transactor,
        };
        let result = work(&txn_scope)?;
        txn_scope.flush()?;
        transactor.drain_pending()?;
        transaction.commit()?;
        drop(guard);

        trace!(txn = %transaction.handle(), "transaction committed");
        transaction.run_commit_listeners();
        Ok(result)
    }
}

impl Drop for Transactor {
    fn drop(&mut self) {
        let unflushed = self.deferrer.get_mut().len();
        if unflushed > 0 {
            warn!(unflushed, "scope dropped without flushing deferred operations");
        }
    }
}

/// Cleans up an attempt that did not commit: rolls back the transaction
/// and drops whatever the attempt left buffered.
struct AttemptGuard<'a> {
    transaction: &'a Transaction,
    transactor: &'a Transactor,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.transaction.is_active() {
            if let Err(err) = self.transaction.rollback() {
                error!(txn = %self.transaction.handle(), error = %err, "rollback failed, suppressing error");
            }
        }
        let deferred = self.transactor.deferrer.borrow_mut().discard();
        let pending = self.transactor.pending.borrow_mut().discard();
        if deferred > 0 || pending > 0 {
            debug!(deferred, pending, "discarded work of failed transaction attempt");
        }
    }
}
