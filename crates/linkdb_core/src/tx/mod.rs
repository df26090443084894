//! Session-scoped transactions with optimistic concurrency control.

mod manager;
mod state;

pub use state::{Transaction, TransactionState};

pub(crate) use manager::{commit, delete_record, rollback, save_record};
pub(crate) use state::RecordOp;
