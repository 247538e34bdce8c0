//! Transactions: native transaction state and the transactor that runs
//! units of work under a propagation policy.

mod state;
mod transactor;

pub use state::{Transaction, TransactionState};
pub use transactor::Propagation;

pub(crate) use transactor::Transactor;
