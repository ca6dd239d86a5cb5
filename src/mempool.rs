//! Pending-transaction queue and admission.
//!
//! Admission is the only point where the tracked nonce advances ahead of a
//! sealed block, which lets a sender queue a strictly-sequential run of
//! transactions in one round. The pool keeps arrival order and never
//! reorders: a gap nonce is rejected outright rather than parked. A
//! rejection mutates nothing.

use crate::{
    state::State,
    transaction::{Kind, Transaction},
    Error,
};

/// Queue of admitted-but-unsealed transactions.
#[derive(Clone, Debug, Default)]
pub struct Mempool {
    queue: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `tx` against `state` and queue it. On acceptance the
    /// sender's tracked nonce advances; on rejection neither the queue nor
    /// the state changes.
    pub fn admit(&mut self, state: &mut State, tx: Transaction) -> Result<(), Error> {
        tx.well_formed()?;
        if !tx.verify() {
            return Err(Error::SignatureInvalid);
        }
        let account = state.account(&tx.sender);
        let expected = account.nonce + 1;
        if tx.nonce != expected {
            return Err(Error::NonceMismatch {
                expected,
                got: tx.nonce,
            });
        }
        if matches!(tx.kind, Kind::Pay | Kind::OpenRemit | Kind::Stake) {
            let required = tx.charged()?;
            if account.balance < required {
                return Err(Error::InsufficientFunds {
                    required,
                    available: account.balance,
                });
            }
        }
        state.account_mut(&tx.sender).nonce += 1;
        self.queue.push(tx);
        Ok(())
    }

    /// Queued transactions in arrival order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drop the queued transactions `keep` refuses, preserving order.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Transaction) -> bool,
    {
        self.queue.retain(keep);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
