// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use chainyard_types::{AccountAddress, ChainId, Ipv4Cidr};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Default seconds between produced blocks when the spec leaves it unset.
pub const DEFAULT_BLOCK_INTERVAL_SECS: u64 = 5;

/// The consensus algorithm a network runs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConsensusKind {
    #[serde(rename = "authority-round")]
    AuthorityRound,
    #[serde(rename = "byzantine-fault-tolerant-v1")]
    BftV1,
    #[serde(rename = "byzantine-fault-tolerant-v2")]
    BftV2,
}

impl ConsensusKind {
    pub fn is_bft(&self) -> bool {
        matches!(self, ConsensusKind::BftV1 | ConsensusKind::BftV2)
    }

    /// Per-consensus cap on the signer-account set.
    pub fn max_signers(&self) -> usize {
        match self {
            ConsensusKind::AuthorityRound => 10,
            ConsensusKind::BftV1 | ConsensusKind::BftV2 => 20,
        }
    }
}

impl fmt::Display for ConsensusKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ConsensusKind::AuthorityRound => "authority-round",
            ConsensusKind::BftV1 => "byzantine-fault-tolerant-v1",
            ConsensusKind::BftV2 => "byzantine-fault-tolerant-v2",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ConsensusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authority-round" => Ok(ConsensusKind::AuthorityRound),
            "byzantine-fault-tolerant-v1" => Ok(ConsensusKind::BftV1),
            "byzantine-fault-tolerant-v2" => Ok(ConsensusKind::BftV2),
            _ => Err(format!("unknown consensus kind: {}", s)),
        }
    }
}

/// An account written into the genesis allocation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GenesisAccount {
    pub address: AccountAddress,
    /// Starting balance in the chain's smallest unit.
    pub balance: u128,
}

/// The immutable-once-launched descriptor of one network.
///
/// `name` doubles as the container-network identifier. `chain_id` and
/// `subnet` must be globally unique across all locally tracked networks at
/// creation time; the topology validator enforces both.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetworkSpec {
    pub name: String,
    pub chain_id: ChainId,
    pub subnet: Ipv4Cidr,
    pub consensus: ConsensusKind,
    pub gas_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_interval_secs: Option<u64>,
    /// Accounts authorized to produce blocks, in consensus order.
    pub signer_accounts: Vec<GenesisAccount>,
    /// Prefunded accounts with no consensus role.
    #[serde(default)]
    pub prefunded_accounts: Vec<GenesisAccount>,
}

impl NetworkSpec {
    pub fn block_interval_secs(&self) -> u64 {
        self.block_interval_secs
            .unwrap_or(DEFAULT_BLOCK_INTERVAL_SECS)
    }
}

/// Relation between a signer-role node and a signer account.
///
/// This is a relation, not ownership: the account lives in [`NetworkSpec`],
/// the node in the topology. Under authority-round the relation must be a
/// bijection.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignerAssociation {
    pub node_name: String,
    pub account: AccountAddress,
}
