// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0


use crate::{ConsensusKind, GenesisAccount, NetworkSpec, NodeRole, NodeSpec};
use chainyard_types::{AccountAddress, ChainId};
use std::net::Ipv4Addr;

/// A minimal healthy authority-round spec: one bootstrap, one signer.
pub fn aura_spec() -> (NetworkSpec, Vec<NodeSpec>) {
    let spec = NetworkSpec {
        name: "testnet".to_string(),
        chain_id: ChainId::new(9999),
        subnet: "10.0.0.0/24".parse().unwrap(),
        consensus: ConsensusKind::AuthorityRound,
        gas_limit: 8_000_000,
        block_interval_secs: None,
        signer_accounts: vec![GenesisAccount {
            address: account(0xAA),
            balance: 1_000_000_000_000_000_000,
        }],
        prefunded_accounts: vec![],
    };
    let nodes = vec![
        NodeSpec::new("boot-0", ip(10), 8545, NodeRole::Bootstrap),
        NodeSpec::new("signer-0", ip(11), 8545, NodeRole::Signer),
    ];
    (spec, nodes)
}

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

pub fn account(fill: u8) -> AccountAddress {
    AccountAddress::new([fill; 20])
}
