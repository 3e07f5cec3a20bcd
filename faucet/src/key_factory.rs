// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic account derivation from a seed phrase.
//!
//! Dev networks need the same test accounts on every run, so keys are
//! derived from a phrase at a fixed path rather than sampled fresh. The
//! phrase is kept in the clear; nothing derived here should ever hold
//! value outside a private network.

use chainyard_types::AccountAddress;
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};
use sha3::{Digest, Keccak256};

/// Fixed derivation path label baked into every child-key hash.
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0";

const SEED_SALT: &[u8] = b"CHAINYARD SEED";
const SEED_ROUNDS: usize = 2048;

/// Index of one derived account under [`DERIVATION_PATH`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChildNumber(pub u64);

/// Master entropy stretched from a seed phrase.
pub struct Seed([u8; 32]);

impl Seed {
    pub fn new(phrase: &str) -> Self {
        let mut state: [u8; 32] = Keccak256::digest(
            [SEED_SALT, phrase.as_bytes()].concat(),
        )
        .into();
        // Simple iterated strengthening; determinism is the point here,
        // not resistance to offline guessing.
        for _ in 0..SEED_ROUNDS {
            state = Keccak256::digest([&state[..], SEED_SALT].concat()).into();
        }
        Seed(state)
    }
}

/// One derived keypair with its account address.
pub struct ChildKey {
    pub child: ChildNumber,
    signing_key: SigningKey,
    pub address: AccountAddress,
}

impl ChildKey {
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }
}

/// Derives child keys from a [`Seed`] at [`DERIVATION_PATH`].
pub struct KeyFactory {
    seed: Seed,
}

impl KeyFactory {
    pub fn new(seed: Seed) -> Self {
        KeyFactory { seed }
    }

    /// The key at `child`. Deterministic: the same seed and child always
    /// yield the same key.
    pub fn private_child(&self, child: ChildNumber) -> ChildKey {
        // A digest lands outside the curve order with probability ~2^-128;
        // bump a counter until the scalar is valid so derivation is total.
        let mut counter: u64 = 0;
        loop {
            let material: [u8; 32] = Keccak256::digest(
                [
                    &self.seed.0[..],
                    DERIVATION_PATH.as_bytes(),
                    &child.0.to_le_bytes(),
                    &counter.to_le_bytes(),
                ]
                .concat(),
            )
            .into();
            if let Ok(signing_key) = SigningKey::from_slice(&material) {
                let point = signing_key.verifying_key().to_encoded_point(false);
                let address = AccountAddress::from_public_key_bytes(&point.as_bytes()[1..]);
                return ChildKey {
                    child,
                    signing_key,
                    address,
                };
            }
            counter += 1;
        }
    }

    /// The first `count` derived accounts, in child order.
    pub fn derive_accounts(&self, count: u64) -> Vec<ChildKey> {
        (0..count).map(|i| self.private_child(ChildNumber(i))).collect()
    }
}
