//! Write results that have not been joined yet.

use crate::error::{CoreError, CoreResult};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::error;

enum Slot<T> {
    Ready(CoreResult<T>),
    Joined,
}

/// Result of a save or delete.
///
/// Call [`Pending::now`] to obtain it. A result that is never joined is
/// still checked when its scope closes: a failure surfaces from
/// [`crate::Scope::close`].
pub struct Pending<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T: 'static> Pending<T> {
    pub(crate) fn new(result: CoreResult<T>, completions: &mut PendingCompletions) -> Self {
        let failed = result.is_err();
        let slot = Rc::new(RefCell::new(Slot::Ready(result)));
        if failed {
            completions.register(slot.clone());
        }
        Self { slot }
    }

    /// Joins the result.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying write, or an invalid operation
    /// error if the scope already surfaced it at close.
    pub fn now(self) -> CoreResult<T> {
        match std::mem::replace(&mut *self.slot.borrow_mut(), Slot::Joined) {
            Slot::Ready(result) => result,
            Slot::Joined => Err(CoreError::invalid_operation(
                "result was already surfaced when its scope closed",
            )),
        }
    }

    /// Checks whether the write failed, without joining.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(&*self.slot.borrow(), Slot::Ready(Err(_)))
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.borrow() {
            Slot::Ready(Ok(_)) => "ready",
            Slot::Ready(Err(_)) => "failed",
            Slot::Joined => "joined",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

/// Type-erased view of a pending slot.
trait Completion {
    /// Takes the error of an unjoined failed result.
    fn take_unjoined_error(&self) -> Option<CoreError>;

    /// Checks whether the result was joined.
    fn is_joined(&self) -> bool;
}

impl<T> Completion for RefCell<Slot<T>> {
    fn is_joined(&self) -> bool {
        matches!(&*self.borrow(), Slot::Joined)
    }

    fn take_unjoined_error(&self) -> Option<CoreError> {
        let mut slot = self.borrow_mut();
        if !matches!(&*slot, Slot::Ready(Err(_))) {
            return None;
        }
        match std::mem::replace(&mut *slot, Slot::Joined) {
            Slot::Ready(Err(err)) => Some(err),
            _ => None,
        }
    }
}

/// Per-scope list of failed results nobody has joined yet.
///
/// Successful results are never tracked, and joined ones are pruned on
/// every registration.
#[derive(Default)]
pub(crate) struct PendingCompletions {
    items: Vec<Rc<dyn Completion>>,
}

impl PendingCompletions {
    fn register<T: 'static>(&mut self, slot: Rc<RefCell<Slot<T>>>) {
        self.items.retain(|item| !item.is_joined());
        self.items.push(slot);
    }

    /// Checks every registered result and forgets them.
    ///
    /// The first unjoined failure is returned; later ones are logged.
    pub(crate) fn drain(&mut self) -> CoreResult<()> {
        let mut first = None;
        for item in self.items.drain(..) {
            if let Some(err) = item.take_unjoined_error() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    error!(error = %err, "additional pending write failed");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Forgets every registered result without checking. Returns how many
    /// there were.
    pub(crate) fn discard(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

impl fmt::Debug for PendingCompletions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCompletions")
            .field("len", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_result_is_not_surfaced_again() {
        let mut completions = PendingCompletions::default();
        let pending: Pending<u32> =
            Pending::new(Err(CoreError::invalid_operation("x")), &mut completions);

        assert!(pending.is_failed());
        assert!(pending.now().is_err());
        assert!(completions.drain().is_ok());
    }

    #[test]
    fn unjoined_failure_surfaces_at_drain() {
        let mut completions = PendingCompletions::default();
        let _ok = Pending::new(Ok(1u32), &mut completions);
        let failed = Pending::<u32>::new(Err(CoreError::invalid_operation("boom")), &mut completions);
        let _also_failed = Pending::<()>::new(Err(CoreError::invalid_operation("later")), &mut completions);

        let err = completions.drain().unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(completions.len(), 0);
        assert!(failed.now().is_err());
    }

    #[test]
    fn joined_and_successful_results_are_not_retained() {
        let mut completions = PendingCompletions::default();
        for i in 0..1000u32 {
            Pending::new(Ok(i), &mut completions).now().unwrap();
        }
        assert_eq!(completions.len(), 0);

        for _ in 0..1000 {
            let failed = Pending::<()>::new(Err(CoreError::invalid_operation("x")), &mut completions);
            assert!(failed.now().is_err());
        }
        assert!(completions.len() <= 1);
        assert!(completions.drain().is_ok());
    }

    #[test]
    fn discard_forgets_without_checking() {
        let mut completions = PendingCompletions::default();
        let _failed = Pending::<()>::new(Err(CoreError::invalid_operation("x")), &mut completions);
        assert_eq!(completions.discard(), 1);
        assert!(completions.drain().is_ok());
    }
}
