// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric chain identifier of a network.
///
/// Private networks must pick an id that collides neither with a well-known
/// public chain nor with another locally tracked network.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

/// Chain ids claimed by public networks. A private network reusing one of
/// these would let wallets and replayed transactions cross networks.
pub const RESERVED_PUBLIC_CHAIN_IDS: &[u64] = &[
    1,        // mainnet
    3,        // ropsten
    4,        // rinkeby
    5,        // goerli
    10,       // optimism
    25,       // cronos
    42,       // kovan
    56,       // bsc
    61,       // ethereum classic
    100,      // gnosis
    137,      // polygon
    250,      // fantom
    8453,     // base
    42161,    // arbitrum one
    43114,    // avalanche
    11155111, // sepolia
];

impl ChainId {
    pub fn new(id: u64) -> Self {
        ChainId(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_PUBLIC_CHAIN_IDS.contains(&self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
