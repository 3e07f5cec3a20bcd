// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::{convert::TryFrom, fmt, str::FromStr};
use thiserror::Error;

pub const ADDRESS_LENGTH: usize = 20;

/// A 20-byte account address, displayed as `0x` + 40 lowercase hex digits.
///
/// Addresses are derived from a secp256k1 public key by hashing the 64-byte
/// uncompressed key body with Keccak-256 and keeping the low-order 20 bytes.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AccountAddress([u8; ADDRESS_LENGTH]);

#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error("account address must start with 0x, got {0:?}")]
    MissingPrefix(String),
    #[error("account address must be 0x followed by {} hex digits", ADDRESS_LENGTH * 2)]
    InvalidLength,
    #[error("account address contains non-hex characters: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl AccountAddress {
    pub fn new(address: [u8; ADDRESS_LENGTH]) -> Self {
        AccountAddress(address)
    }

    /// Derives the address for a 64-byte uncompressed secp256k1 public key
    /// body (the encoded point without its 0x04 tag byte).
    pub fn from_public_key_bytes(public_key: &[u8]) -> Self {
        let hash = Keccak256::digest(public_key);
        let mut addr = [0u8; ADDRESS_LENGTH];
        addr.copy_from_slice(&hash[hash.len() - ADDRESS_LENGTH..]);
        AccountAddress(addr)
    }

    /// Parses a `0x`-prefixed hex literal.
    pub fn from_hex_literal(literal: &str) -> Result<Self, AddressParseError> {
        let hex_part = literal
            .strip_prefix("0x")
            .or_else(|| literal.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(literal.to_string()))?;
        if hex_part.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressParseError::InvalidLength);
        }
        let bytes = hex::decode(hex_part)?;
        let mut addr = [0u8; ADDRESS_LENGTH];
        addr.copy_from_slice(&bytes);
        Ok(AccountAddress(addr))
    }

    // Helpful in log messages
    pub fn short_str(&self) -> String {
        hex::encode(&self.0[0..4])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for AccountAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}", self)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self)
    }
}

impl fmt::LowerHex for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl FromStr for AccountAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountAddress::from_hex_literal(s)
    }
}

impl TryFrom<&[u8]> for AccountAddress {
    type Error = AddressParseError;

    fn try_from(bytes: &[u8]) -> Result<AccountAddress, Self::Error> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressParseError::InvalidLength);
        }
        let mut addr = [0u8; ADDRESS_LENGTH];
        addr.copy_from_slice(bytes);
        Ok(AccountAddress(addr))
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = <String>::deserialize(deserializer)?;
        AccountAddress::from_hex_literal(&literal).map_err(de::Error::custom)
    }
}
