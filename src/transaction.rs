//! Signed ledger instructions.
//!
//! A [Transaction] is an immutable value: every field is fixed at
//! construction except for the one-time attachment of a signature. Its
//! digest covers the canonical encoding of all fields except the signature,
//! so signing never changes a transaction's identity. Escrow payloads are a
//! tagged union carrying exactly the fields their kind requires, which moves
//! shape validation to construction; [Transaction::well_formed] covers the
//! residual kind/payload consistency and amount-sign policy.

use crate::{crypto, encoding, Error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The five recognized transaction kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    /// Transfer `amount` from sender to recipient.
    Pay,
    /// Move `amount` from the sender's balance into bonded stake.
    Stake,
    /// Move `amount` from bonded stake back to the sender's balance.
    Unstake,
    /// Open a hash-locked escrow contract funded with `amount`.
    OpenRemit,
    /// Release an open contract by revealing its code.
    ClaimRemit,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Pay => "PAY",
            Kind::Stake => "STAKE",
            Kind::Unstake => "UNSTAKE",
            Kind::OpenRemit => "OPEN_REMIT",
            Kind::ClaimRemit => "CLAIM_REMIT",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload accompanying the escrow kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Opens a contract releasable by the preimage of `release_hash`.
    OpenRemit {
        id: String,
        recipient: String,
        release_hash: String,
    },
    /// Claims contract `id` by revealing `release_code`.
    ClaimRemit { id: String, release_code: String },
}

impl Payload {
    fn to_value(&self) -> Value {
        match self {
            Payload::OpenRemit {
                id,
                recipient,
                release_hash,
            } => json!({
                "id": id,
                "recipient": recipient,
                "release_hash": release_hash,
            }),
            Payload::ClaimRemit { id, release_code } => json!({
                "id": id,
                "release_code": release_code,
            }),
        }
    }
}

/// A typed, signed instruction against the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: Kind,
    /// Hex-encoded public key of the originator; verbatim account address.
    pub sender: String,
    pub recipient: Option<String>,
    pub amount: u64,
    pub fee: u64,
    /// Must be exactly one past the sender's current account nonce.
    pub nonce: u64,
    pub payload: Option<Payload>,
    /// Hex-encoded ECDSA signature over the canonical body, or the reward
    /// sentinel for the synthetic block-reward transaction.
    pub signature: Option<String>,
}

impl Transaction {
    /// Construct an unsigned transaction.
    pub fn new(
        kind: Kind,
        sender: impl Into<String>,
        recipient: Option<String>,
        amount: u64,
        fee: u64,
        nonce: u64,
        payload: Option<Payload>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            recipient,
            amount,
            fee,
            nonce,
            payload,
            signature: None,
        }
    }

    /// Canonical bytes of every field except the signature: the hashing and
    /// signing pre-image.
    fn body(&self) -> Vec<u8> {
        encoding::canonical(&json!({
            "amount": self.amount,
            "fee": self.fee,
            "nonce": self.nonce,
            "payload": self.payload.as_ref().map(Payload::to_value),
            "recipient": self.recipient,
            "sender": self.sender,
            "tx_type": self.kind.as_str(),
        }))
    }

    /// Content hash: SHA-256 of the canonical body, hex-encoded.
    pub fn digest(&self) -> String {
        crypto::sha256_hex(&self.body())
    }

    /// Attach an ECDSA signature over the canonical body.
    pub fn sign(&mut self, key: &crypto::PrivateKey) {
        self.signature = Some(key.sign(&self.body()));
    }

    /// Whether the attached signature verifies with `sender` as the public
    /// key. Returns false, never an error, when no signature is attached,
    /// the sender is not a parseable key, or verification fails.
    pub fn verify(&self) -> bool {
        match &self.signature {
            Some(signature) => crypto::verify(&self.sender, &self.body(), signature),
            None => false,
        }
    }

    /// Amount plus fee: the total debited from the sender for funded kinds.
    pub fn charged(&self) -> Result<u64, Error> {
        self.amount
            .checked_add(self.fee)
            .ok_or(Error::Malformed("amount plus fee overflows"))
    }

    /// Structural checks independent of ledger state: the payload variant
    /// and recipient must match the kind, and the amount must be positive
    /// for value-moving kinds (a claim moves the contract's funds, not its
    /// own, and carries amount zero).
    pub fn well_formed(&self) -> Result<(), Error> {
        match (self.kind, &self.payload) {
            (Kind::Pay, _) if self.recipient.is_none() => {
                return Err(Error::Malformed("PAY requires a recipient"))
            }
            (Kind::OpenRemit, Some(Payload::OpenRemit { .. })) => {}
            (Kind::OpenRemit, _) => {
                return Err(Error::Malformed(
                    "OPEN_REMIT requires an {id, recipient, release_hash} payload",
                ))
            }
            (Kind::ClaimRemit, Some(Payload::ClaimRemit { .. })) => {}
            (Kind::ClaimRemit, _) => {
                return Err(Error::Malformed(
                    "CLAIM_REMIT requires an {id, release_code} payload",
                ))
            }
            _ => {}
        }
        match self.kind {
            Kind::Pay | Kind::OpenRemit | Kind::Stake | Kind::Unstake if self.amount == 0 => {
                Err(Error::Malformed("amount must be positive"))
            }
            Kind::ClaimRemit if self.amount != 0 => {
                Err(Error::Malformed("CLAIM_REMIT carries no amount"))
            }
            _ => Ok(()),
        }
    }
}
