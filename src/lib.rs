//! Minimal ledger with pluggable consensus.
//!
//! `remchain` maintains a chain of ECDSA-signed transactions over an account
//! table (balances, nonces, bonded stake) plus hash-locked escrow contracts
//! ("remittances"). Blocks are sealed either by Proof-of-Work search or by
//! deterministic stake-weighted Proof-of-Stake selection with equivocation
//! slashing. Replaying the same chain from genesis always reproduces the same
//! state; fork choice validates a candidate chain by full replay against a
//! scratch state and adopts it only if it is strictly longer and clean.
//!
//! The [Ledger] is the single mutable surface. It is not internally
//! synchronized: a node wraps it in a `Mutex` (one logical writer at a time)
//! and dispatches any peer broadcast only after the lock is released. The
//! Proof-of-Work search is the one long-running operation; it takes a
//! cancellation flag and a cancelled attempt leaves every table untouched.
//!
//! Transport, persistence, the HTTP query surface, and CLI wiring live
//! outside this crate and drive it through [Ledger::submit], [Ledger::mine],
//! [Ledger::replace_chain], and the read accessors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod block;
pub mod consensus;
pub mod crypto;
pub mod encoding;
pub mod ledger;
pub mod mempool;
pub mod merkle;
pub mod state;
pub mod transaction;

pub use block::Block;
pub use consensus::Mode;
pub use ledger::Ledger;
pub use state::{Account, Remittance, State};
pub use transaction::{Kind, Payload, Transaction};

use transaction::Kind as TxKind;

/// Why a transaction, block, or chain was rejected.
///
/// Every variant is recoverable-by-rejection: the caller is told "not
/// accepted" and no lasting state change occurs. A failed mining attempt
/// (empty pool, losing the selection, cancellation) is a normal outcome and
/// is not represented here.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("malformed transaction: {0}")]
    Malformed(&'static str),
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("unparseable key material")]
    KeyFormat,
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("insufficient stake: required {required}, available {available}")]
    InsufficientStake { required: u64, available: u64 },
    #[error("duplicate escrow id {0}")]
    DuplicateEscrowId(String),
    #[error("escrow {0} not found")]
    EscrowNotFound(String),
    #[error("escrow {0} already released")]
    AlreadyReleased(String),
    #[error("wrong release code for escrow {0}")]
    WrongReleaseCode(String),
    #[error("block {index} pays a validator other than the selected one")]
    ConsensusIneligible { index: u64 },
    #[error("chain linkage: {0}")]
    ChainLinkage(&'static str),
    #[error("block {index} does not meet the difficulty target")]
    DifficultyNotMet { index: u64 },
    #[error("block {index} hash does not match its header")]
    HashMismatch { index: u64 },
    #[error("block {index} merkle root does not match its transactions")]
    MerkleMismatch { index: u64 },
    #[error("invalid reward transaction: {0}")]
    RewardMismatch(&'static str),
}

/// Ledger parameters.
///
/// An explicit value owned by the [Ledger] rather than process globals, so
/// two nodes with different parameters can coexist in one process (and in
/// one test).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Which consensus strategy seals blocks.
    pub mode: Mode,
    /// Append a synthetic reward transaction to each sealed block.
    pub enable_reward: bool,
    /// Leading zero hex digits required of a Proof-of-Work block hash.
    pub difficulty: usize,
    /// Base reward per sealed block, in the smallest unit.
    pub block_reward: u64,
    /// Proof-of-Stake inflation per sealed block, in basis points of
    /// `block_reward`.
    pub stake_reward_bps: u64,
    /// Sentinel sender address identifying the reward transaction.
    pub reward_sender: String,
    /// Sentinel signature carried by the reward transaction in place of a
    /// real one.
    pub reward_signature: String,
    /// Genesis balance allocations as (address, amount) pairs. Part of the
    /// genesis definition: replay starts from these, so state stays a pure
    /// function of the chain.
    pub premine: Vec<(String, u64)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::ProofOfWork,
            enable_reward: false,
            difficulty: 4,
            block_reward: 50_000_000,
            stake_reward_bps: 200,
            reward_sender: "COINBASE".into(),
            reward_signature: "COINBASE".into(),
            premine: Vec::new(),
        }
    }
}

impl Config {
    /// Whether `tx` is the synthetic block-reward transaction, recognized
    /// solely by the sentinel sender and sentinel signature. Reward
    /// transactions are exempt from signature, nonce, and balance checks.
    pub fn is_reward(&self, tx: &Transaction) -> bool {
        tx.kind == TxKind::Pay
            && tx.sender == self.reward_sender
            && tx.signature.as_deref() == Some(self.reward_signature.as_str())
    }

    /// The reward transaction for a block paying `miner`: the base reward
    /// plus the fees collected from the block's other transactions. `None`
    /// when the total does not fit a `u64`.
    pub fn reward_transaction(&self, miner: &str, fees: u64) -> Option<Transaction> {
        let amount = self.block_reward.checked_add(fees)?;
        let mut tx = Transaction::new(
            TxKind::Pay,
            self.reward_sender.clone(),
            Some(miner.to_string()),
            amount,
            0,
            0,
            None,
        );
        tx.signature = Some(self.reward_signature.clone());
        Some(tx)
    }

    /// The inflation credited to a Proof-of-Stake validator per sealed block.
    pub fn stake_reward(&self) -> u64 {
        (self.block_reward as u128 * self.stake_reward_bps as u128 / 10_000) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_transaction_recognized() {
        let config = Config::default();
        let tx = config.reward_transaction("miner", 1_000).unwrap();
        assert!(config.is_reward(&tx));
        assert_eq!(tx.amount, config.block_reward + 1_000);
        assert_eq!(tx.fee, 0);
        assert_eq!(tx.recipient.as_deref(), Some("miner"));
    }

    #[test]
    fn test_reward_requires_both_sentinels() {
        let config = Config::default();
        let mut tx = config.reward_transaction("miner", 0).unwrap();
        tx.signature = Some("forged".into());
        assert!(!config.is_reward(&tx));

        let mut tx = config.reward_transaction("miner", 0).unwrap();
        tx.sender = "someone".into();
        assert!(!config.is_reward(&tx));
    }

    #[test]
    fn test_reward_transaction_refuses_unrepresentable_total() {
        let config = Config::default();
        assert!(config.reward_transaction("miner", u64::MAX).is_none());
    }

    #[test]
    fn test_stake_reward_is_two_percent() {
        let config = Config::default();
        assert_eq!(config.stake_reward(), 1_000_000);
    }
}
