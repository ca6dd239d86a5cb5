//! Consensus strategies: Proof-of-Work search and deterministic
//! stake-weighted Proof-of-Stake selection.
//!
//! Proof-of-Work is permissionless: any caller may grind the header nonce
//! until the hash meets the difficulty target. Proof-of-Stake is
//! permissioned: a seed derived from the tip hash and the candidate Merkle
//! root picks exactly one validator, weighted by bonded stake, and only
//! that validator's sealing attempt succeeds. Both sides of the protocol
//! (sealing and replay validation) run the same selection against the same
//! ordered stake table, so they always agree.

use crate::{block::Block, crypto, state::State, Config};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Which consensus strategy seals blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    ProofOfWork,
    ProofOfStake,
}

/// Selection seed for the block extending `previous_hash` with transactions
/// committed by `merkle_root`.
pub fn seed(previous_hash: &str, merkle_root: &str) -> String {
    crypto::sha256_hex(format!("{previous_hash}{merkle_root}").as_bytes())
}

/// Whether `hash` carries `difficulty` leading zero hex digits.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|digit| digit == b'0')
}

/// Grind the block nonce until its hash meets `difficulty`, re-hashing the
/// header each attempt. The search is unbounded by construction; `cancel`
/// is checked between attempts so a superseded attempt can be abandoned.
/// Returns false when cancelled, leaving the caller to discard the
/// candidate.
pub fn solve(block: &mut Block, difficulty: usize, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        block.hash = block.compute_hash();
        if meets_difficulty(&block.hash, difficulty) {
            return true;
        }
        block.nonce += 1;
    }
}

/// Deterministically select the validator entitled to seal the next block.
///
/// The seed, reduced modulo total stake, picks a point on the cumulative
/// stake line; walking the ordered stake table to that point yields the
/// owner. Zero total stake falls back to the reward-issuer sentinel, which
/// is how a Proof-of-Stake chain bootstraps before any stake is bonded.
pub fn select_validator(seed_hex: &str, state: &State, config: &Config) -> String {
    let entries: Vec<(&str, u64)> = state
        .accounts
        .iter()
        .filter(|(_, account)| account.stake > 0)
        .map(|(address, account)| (address.as_str(), account.stake))
        .collect();
    let total: u128 = entries.iter().map(|(_, stake)| *stake as u128).sum();
    if total == 0 {
        return config.reward_sender.clone();
    }
    let target = seed_mod(seed_hex, total);
    let mut upto: u128 = 0;
    for (address, stake) in &entries {
        upto += *stake as u128;
        if upto >= target {
            return (*address).to_string();
        }
    }
    entries[entries.len() - 1].0.to_string()
}

// Reduce a 256-bit hex integer modulo `modulus`, folding one hex digit at a
// time: the running remainder stays below `modulus`, so `r * 16 + d` fits a
// u128 without big-integer arithmetic.
fn seed_mod(seed_hex: &str, modulus: u128) -> u128 {
    let mut remainder: u128 = 0;
    for digit in seed_hex.bytes() {
        let value = (digit as char).to_digit(16).unwrap_or(0) as u128;
        remainder = (remainder * 16 + value) % modulus;
    }
    remainder
}
