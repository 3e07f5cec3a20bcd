// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, net::Ipv4Addr, str::FromStr};
use thiserror::Error;

/// An IPv4 subnet in CIDR notation.
///
/// The stored address is always the network address (host bits masked off),
/// so two `Ipv4Cidr` values compare equal iff they denote the same subnet.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

#[derive(Debug, Error)]
pub enum CidrParseError {
    #[error("subnet must be of the form a.b.c.d/prefix, got {0:?}")]
    MissingPrefix(String),
    #[error("invalid network address in {0:?}")]
    InvalidAddress(String),
    #[error("prefix length must be between 0 and 32, got {0:?}")]
    InvalidPrefix(String),
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CidrParseError> {
        if prefix > 32 {
            return Err(CidrParseError::InvalidPrefix(prefix.to_string()));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_bits(prefix));
        Ok(Ipv4Cidr { network, prefix })
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn network_address(&self) -> Ipv4Addr {
        self.network
    }

    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !Self::mask_bits(self.prefix))
    }

    /// The first host address. Container runtimes claim it for the bridge
    /// gateway, so it is never assignable to a node.
    pub fn gateway_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) + 1)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask_bits(self.prefix) == u32::from(self.network)
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }

    /// Offset of `ip` from the network address. Meaningful only when
    /// `self.contains(ip)`.
    pub fn host_offset(&self, ip: Ipv4Addr) -> u32 {
        u32::from(ip).wrapping_sub(u32::from(self.network))
    }

    /// The address at `offset` hosts above the network address.
    pub fn host_at(&self, offset: u32) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) + offset)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl fmt::Debug for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| CidrParseError::MissingPrefix(s.to_string()))?;
        let addr = addr_part
            .parse::<Ipv4Addr>()
            .map_err(|_| CidrParseError::InvalidAddress(s.to_string()))?;
        let prefix = prefix_part
            .parse::<u8>()
            .map_err(|_| CidrParseError::InvalidPrefix(prefix_part.to_string()))?;
        Ipv4Cidr::new(addr, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
