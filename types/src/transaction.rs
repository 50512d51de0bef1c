//! Transactions batched into blocks.

use serde::{Deserialize, Serialize};

/// A transfer between two accounts. Immutable once created.
///
/// Accounts are opaque numeric identifiers; no balance bookkeeping is
/// applied anywhere in this prototype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub sender: u64,
    pub receiver: u64,
    pub value: u64,
    pub fee: u64,
}

impl Transaction {
    pub fn new(id: u64, sender: u64, receiver: u64, value: u64, fee: u64) -> Self {
        Self {
            id,
            sender,
            receiver,
            value,
            fee,
        }
    }
}
