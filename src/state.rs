//! Ledger state: the account table, escrow contracts, and the deterministic
//! state transition.
//!
//! Three entry points mutate state. [State::apply] is the block applier:
//! pure mutation with no validation, used when committing a block whose
//! transactions already settled. [State::settle] is the assembly-time
//! transition: it enforces the funds preconditions against the running
//! pre-block state and applies the effects, so a queued transaction that
//! only fits before its queued predecessors spend the balance is caught
//! before it reaches a block. [State::execute] is the checked transition
//! used by full-chain replay: settlement-grade preconditions plus strict
//! nonce and escrow checks, advancing the sender's nonce.

use crate::{
    crypto,
    transaction::{Kind, Payload, Transaction},
    Config, Error,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-address balance, transaction counter, and bonded stake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
    pub nonce: u64,
    pub stake: u64,
}

/// A hash-locked escrow contract.
///
/// Created by an OPEN_REMIT transaction, released at most once by a
/// CLAIM_REMIT revealing the committed code, and never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remittance {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub release_hash: String,
    pub released: bool,
}

/// Accounts and escrow contracts.
///
/// Both tables are ordered maps: Proof-of-Stake selection walks the stake
/// table and requires a stable iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub accounts: BTreeMap<String, Account>,
    pub remits: BTreeMap<String, Remittance>,
}

// A failed debit is a logic bug upstream: trip loudly in debug builds,
// saturate in release.
fn debit(slot: &mut u64, amount: u64) {
    debug_assert!(*slot >= amount, "ledger debit underflow");
    *slot = slot.saturating_sub(amount);
}

impl State {
    /// Fresh state carrying the configured genesis allocations.
    pub fn genesis(config: &Config) -> Self {
        let mut state = Self::default();
        for (address, balance) in &config.premine {
            state.account_mut(address).balance = *balance;
        }
        state
    }

    /// The account at `address`; absence reads as the all-zero account.
    pub fn account(&self, address: &str) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    /// The account entry at `address`, created lazily.
    pub fn account_mut(&mut self, address: &str) -> &mut Account {
        self.accounts.entry(address.to_string()).or_default()
    }

    /// Apply `tx` unconditionally. Callers guarantee the transaction was
    /// validated at admission or replay time; the one tolerated mismatch is
    /// a claim against a missing, released, or mis-coded contract, which is
    /// a no-op at this layer.
    pub fn apply(&mut self, tx: &Transaction, config: &Config) {
        match tx.kind {
            Kind::Pay => {
                if !config.is_reward(tx) {
                    debit(
                        &mut self.account_mut(&tx.sender).balance,
                        tx.amount.saturating_add(tx.fee),
                    );
                }
                if let Some(recipient) = &tx.recipient {
                    self.account_mut(recipient).balance += tx.amount;
                }
            }
            Kind::Stake => {
                let account = self.account_mut(&tx.sender);
                debit(&mut account.balance, tx.amount);
                account.stake += tx.amount;
            }
            Kind::Unstake => {
                let account = self.account_mut(&tx.sender);
                debit(&mut account.stake, tx.amount);
                account.balance += tx.amount;
            }
            Kind::OpenRemit => {
                if let Some(Payload::OpenRemit {
                    id,
                    recipient,
                    release_hash,
                }) = &tx.payload
                {
                    self.remits.insert(
                        id.clone(),
                        Remittance {
                            id: id.clone(),
                            sender: tx.sender.clone(),
                            recipient: recipient.clone(),
                            amount: tx.amount,
                            release_hash: release_hash.clone(),
                            released: false,
                        },
                    );
                    debit(
                        &mut self.account_mut(&tx.sender).balance,
                        tx.amount.saturating_add(tx.fee),
                    );
                }
            }
            Kind::ClaimRemit => {
                if let Some(Payload::ClaimRemit { id, release_code }) = &tx.payload {
                    self.release(id, release_code);
                }
            }
        }
    }

    /// Funds preconditions for `tx` against the current state: sufficient
    /// balance or stake for its kind and escrow id uniqueness. Reward
    /// transactions are exempt; claims are unchecked here (their release
    /// preconditions are either strict, in [State::execute], or tolerated
    /// as a no-op, in [State::apply]).
    fn check_funds(&self, tx: &Transaction, config: &Config) -> Result<(), Error> {
        if config.is_reward(tx) {
            return Ok(());
        }
        match tx.kind {
            Kind::Pay => self.check_balance(&tx.sender, tx.charged()?),
            Kind::Stake => self.check_balance(&tx.sender, tx.amount),
            Kind::Unstake => {
                let available = self.account(&tx.sender).stake;
                if available < tx.amount {
                    return Err(Error::InsufficientStake {
                        required: tx.amount,
                        available,
                    });
                }
                Ok(())
            }
            Kind::OpenRemit => {
                let id = match &tx.payload {
                    Some(Payload::OpenRemit { id, .. }) => id,
                    _ => {
                        return Err(Error::Malformed(
                            "OPEN_REMIT requires an {id, recipient, release_hash} payload",
                        ))
                    }
                };
                if self.remits.contains_key(id) {
                    return Err(Error::DuplicateEscrowId(id.clone()));
                }
                self.check_balance(&tx.sender, tx.charged()?)
            }
            Kind::ClaimRemit => Ok(()),
        }
    }

    /// Settle `tx` at block assembly: check the funds preconditions against
    /// the running pre-block state, then apply. A claim that cannot release
    /// still settles (admission never inspects escrow state; the applier
    /// treats it as a no-op). A returned error means nothing moved.
    pub fn settle(&mut self, tx: &Transaction, config: &Config) -> Result<(), Error> {
        self.check_funds(tx, config)?;
        self.apply(tx, config);
        Ok(())
    }

    /// Execute `tx` with full precondition checks, advancing the sender's
    /// nonce. Reward transactions (recognized by the configured sentinels)
    /// skip the nonce and funds checks. All checks run before any mutation:
    /// a returned error means nothing moved.
    pub fn execute(&mut self, tx: &Transaction, config: &Config) -> Result<(), Error> {
        let reward = config.is_reward(tx);
        if !reward {
            let expected = self.account(&tx.sender).nonce + 1;
            if tx.nonce != expected {
                return Err(Error::NonceMismatch {
                    expected,
                    got: tx.nonce,
                });
            }
        }
        self.check_funds(tx, config)?;
        if tx.kind == Kind::ClaimRemit {
            let (id, code) = match &tx.payload {
                Some(Payload::ClaimRemit { id, release_code }) => (id, release_code),
                _ => {
                    return Err(Error::Malformed(
                        "CLAIM_REMIT requires an {id, release_code} payload",
                    ))
                }
            };
            match self.remits.get(id) {
                None => return Err(Error::EscrowNotFound(id.clone())),
                Some(remit) if remit.released => return Err(Error::AlreadyReleased(id.clone())),
                Some(remit) if crypto::sha256_hex(code.as_bytes()) != remit.release_hash => {
                    return Err(Error::WrongReleaseCode(id.clone()))
                }
                Some(_) => {}
            }
        }
        if !reward {
            self.account_mut(&tx.sender).nonce += 1;
        }
        self.apply(tx, config);
        Ok(())
    }

    /// Release the contract at `id` to its recipient if it exists, is
    /// unreleased, and `code` hashes to its commitment. Returns whether
    /// funds moved.
    fn release(&mut self, id: &str, code: &str) -> bool {
        let (recipient, amount) = match self.remits.get(id) {
            Some(remit)
                if !remit.released
                    && crypto::sha256_hex(code.as_bytes()) == remit.release_hash =>
            {
                (remit.recipient.clone(), remit.amount)
            }
            _ => return false,
        };
        self.account_mut(&recipient).balance += amount;
        if let Some(remit) = self.remits.get_mut(id) {
            remit.released = true;
        }
        true
    }

    fn check_balance(&self, address: &str, required: u64) -> Result<(), Error> {
        let available = self.account(address).balance;
        if available < required {
            return Err(Error::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }
}
