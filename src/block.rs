//! Blocks: a header binding an ordered transaction list via its Merkle root.
//!
//! The block hash covers only the header fields `{index, previous_hash,
//! timestamp, nonce, merkle_root}`; transactions are bound in through the
//! root. A committed block is never mutated: re-mining produces a new
//! nonce and hash on a fresh candidate.

use crate::{crypto, encoding, merkle, transaction::Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    /// Milliseconds since the Unix epoch. An integer timestamp keeps the
    /// canonical encoding identical across platforms.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    /// Proof-of-Work counter.
    pub nonce: u64,
    pub merkle_root: String,
    pub hash: String,
}

impl Block {
    /// A candidate block at `index` extending `previous_hash`, with the
    /// root and hash still unset.
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            timestamp,
            transactions,
            nonce: 0,
            merkle_root: String::new(),
            hash: String::new(),
        }
    }

    /// The genesis block: index 0, no transactions, empty root.
    pub fn genesis(timestamp: u64) -> Self {
        let mut genesis = Self::new(0, GENESIS_PREVIOUS_HASH, timestamp, Vec::new());
        genesis.merkle_root = merkle::root(&[]);
        genesis.hash = genesis.compute_hash();
        genesis
    }

    /// Digests of the contained transactions, in order.
    pub fn tx_digests(&self) -> Vec<String> {
        self.transactions.iter().map(Transaction::digest).collect()
    }

    /// Recompute the Merkle root from the current transactions and hash the
    /// header fields.
    pub fn compute_hash(&self) -> String {
        let root = merkle::root(&self.tx_digests());
        crypto::sha256_hex(&encoding::canonical(&json!({
            "idx": self.index,
            "mrkl": root,
            "nonce": self.nonce,
            "prev": self.previous_hash,
            "ts": self.timestamp,
        })))
    }

    /// Whether the recorded hash and root match recomputation. An unset
    /// root is tolerated; an unset hash is not.
    pub fn is_self_consistent(&self) -> bool {
        self.hash == self.compute_hash()
            && (self.merkle_root.is_empty() || self.merkle_root == merkle::root(&self.tx_digests()))
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
