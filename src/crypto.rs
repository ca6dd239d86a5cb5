//! ECDSA keys and SHA-256 helpers.
//!
//! Signatures are ECDSA over secp256r1 with a SHA-256 digest, generated
//! deterministically per [RFC 6979](https://datatracker.ietf.org/doc/html/rfc6979)
//! and normalized to low-S form; high-S signatures are rejected on
//! verification. Public keys travel as hex-encoded SEC1 points and double as
//! account addresses: the ledger compares them verbatim and derives nothing
//! from them.

use crate::Error;
use p256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::scalar::IsHigh,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

const SIGNATURE_LENGTH: usize = 64; // R || S

/// SHA-256 of `data`, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// An ECDSA private key over secp256r1.
#[derive(Clone)]
pub struct PrivateKey {
    signer: SigningKey,
}

impl PrivateKey {
    /// Generate a fresh key from the operating system RNG.
    pub fn random() -> Self {
        Self {
            signer: SigningKey::random(&mut OsRng),
        }
    }

    /// Parse a hex-encoded 32-byte scalar.
    pub fn from_hex(encoded: &str) -> Result<Self, Error> {
        let bytes = hex::decode(encoded).map_err(|_| Error::KeyFormat)?;
        let signer = SigningKey::from_slice(&bytes).map_err(|_| Error::KeyFormat)?;
        Ok(Self { signer })
    }

    /// Hex encoding of the private scalar.
    pub fn to_hex(&self) -> String {
        hex::encode(self.signer.to_bytes())
    }

    /// The account address: hex encoding of the compressed SEC1 public key.
    pub fn address(&self) -> String {
        hex::encode(self.signer.verifying_key().to_encoded_point(true).as_bytes())
    }

    /// Sign `message`, returning a hex-encoded `R || S` signature in low-S
    /// form.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signer.sign(message);
        let signature = match signature.normalize_s() {
            Some(normalized) => normalized,
            None => signature,
        };
        hex::encode(signature.to_bytes())
    }
}

/// Verify a hex-encoded signature over `message` against `address`
/// interpreted as a hex-encoded SEC1 public key (compressed or uncompressed).
///
/// Returns false, never an error: an unparseable address, a malformed or
/// high-S signature, and a plain verification failure are indistinguishable
/// to the caller.
pub fn verify(address: &str, message: &[u8], signature: &str) -> bool {
    let key_bytes = match hex::decode(address) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let verifier = match VerifyingKey::from_sec1_bytes(&key_bytes) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let sig_bytes = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let sig_bytes: [u8; SIGNATURE_LENGTH] = match sig_bytes.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    if signature.s().is_high().into() {
        // A malleable sibling of a valid signature must not verify.
        return false;
    }
    verifier.verify(message, &signature).is_ok()
}
