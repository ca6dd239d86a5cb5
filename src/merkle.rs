//! Merkle accumulator over transaction digests.
//!
//! The simplest correct construction: adjacent hex digests are concatenated
//! as text and re-hashed layer by layer, duplicating the last element of an
//! odd layer, until a single digest remains. There is no leaf/node domain
//! separation; that is an accepted simplification for this system's threat
//! model, not a second-preimage-hardened design.

use crate::crypto::sha256_hex;

/// Fold an ordered sequence of hex digests into one root.
///
/// The empty sequence folds to the hash of the empty byte string, the
/// canonical empty root carried by genesis.
pub fn root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return sha256_hex(b"");
    }
    let mut layer = hashes.to_vec();
    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            layer.push(layer[layer.len() - 1].clone());
        }
        layer = layer
            .chunks(2)
            .map(|pair| sha256_hex(format!("{}{}", pair[0], pair[1]).as_bytes()))
            .collect();
    }
    layer.swap_remove(0)
}
