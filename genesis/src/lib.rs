// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Construction of the chain's founding document.
//!
//! The genesis document is built exactly once, at network creation, and is
//! immutable from the moment any node produces a block. The topology update
//! path never calls into this crate.

use chainyard_config::{ConsensusKind, NetworkSpec, SignerAssociation};
use chainyard_types::AccountAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Zero bytes preceding the signer list in authority-round extra-data.
const EXTRA_VANITY_LEN: usize = 32;
/// Zero bytes reserved for the seal after the signer list.
const EXTRA_SEAL_LEN: usize = 65;

/// The immutable founding state of a chain.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisDocument {
    pub chain_id: u64,
    pub consensus: ConsensusKind,
    pub block_interval_secs: u64,
    pub gas_limit: u64,
    /// `0x`-hex. For authority-round the byte layout is load-bearing:
    /// 32 zero bytes, the signer addresses in spec order, 65 zero bytes.
    pub extra_data: String,
    /// Explicit validator set for the byzantine-fault-tolerant variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validators: Option<Vec<AccountAddress>>,
    pub alloc: BTreeMap<AccountAddress, AllocEntry>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AllocEntry {
    /// Decimal string; genesis balances routinely exceed what JSON numbers
    /// carry faithfully.
    pub balance: String,
}

impl GenesisDocument {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("genesis documents always serialize")
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub struct GenesisBuilder;

impl GenesisBuilder {
    /// Builds the genesis document. Deterministic and pure: the same spec,
    /// associations and producer account always yield the same document.
    ///
    /// `block_producer` is the signer account of the node elected to
    /// produce the first blocks; it receives `default_miner_balance` only
    /// if no explicit allocation already funds it.
    pub fn build(
        spec: &NetworkSpec,
        associations: &[SignerAssociation],
        block_producer: AccountAddress,
        default_miner_balance: u128,
    ) -> GenesisDocument {
        debug_assert!(
            associations
                .iter()
                .all(|a| spec.signer_accounts.iter().any(|s| s.address == a.account)),
            "every association must reference a spec signer account"
        );

        let extra_data = match spec.consensus {
            ConsensusKind::AuthorityRound => authority_round_extra_data(spec),
            ConsensusKind::BftV1 | ConsensusKind::BftV2 => padding_only_extra_data(),
        };

        let validators = if spec.consensus.is_bft() {
            Some(spec.signer_accounts.iter().map(|a| a.address).collect())
        } else {
            None
        };

        // Signers first, then explicit prefunds, then the block producer's
        // default. First writer wins, so a reused address neither
        // double-credits nor clobbers an explicit signer balance.
        let mut alloc: BTreeMap<AccountAddress, AllocEntry> = BTreeMap::new();
        for account in spec.signer_accounts.iter().chain(&spec.prefunded_accounts) {
            alloc.entry(account.address).or_insert_with(|| AllocEntry {
                balance: account.balance.to_string(),
            });
        }
        alloc.entry(block_producer).or_insert_with(|| AllocEntry {
            balance: default_miner_balance.to_string(),
        });

        GenesisDocument {
            chain_id: spec.chain_id.id(),
            consensus: spec.consensus,
            block_interval_secs: spec.block_interval_secs(),
            gas_limit: spec.gas_limit,
            extra_data,
            validators,
            alloc,
        }
    }
}

/// 32 zero bytes ++ 20 bytes per signer in spec order ++ 65 zero bytes.
fn authority_round_extra_data(spec: &NetworkSpec) -> String {
    let mut bytes = Vec::with_capacity(
        EXTRA_VANITY_LEN + spec.signer_accounts.len() * 20 + EXTRA_SEAL_LEN,
    );
    bytes.extend_from_slice(&[0u8; EXTRA_VANITY_LEN]);
    for account in &spec.signer_accounts {
        bytes.extend_from_slice(account.address.as_ref());
    }
    bytes.extend_from_slice(&[0u8; EXTRA_SEAL_LEN]);
    format!("0x{}", hex::encode(bytes))
}

fn padding_only_extra_data() -> String {
    format!("0x{}", hex::encode([0u8; EXTRA_VANITY_LEN + EXTRA_SEAL_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainyard_config::GenesisAccount;
    use chainyard_types::ChainId;

    fn account(fill: u8) -> AccountAddress {
        AccountAddress::new([fill; 20])
    }

    fn spec_with_signers(consensus: ConsensusKind, signers: &[(u8, u128)]) -> NetworkSpec {
        NetworkSpec {
            name: "testnet".to_string(),
            chain_id: ChainId::new(9999),
            subnet: "10.0.0.0/24".parse().unwrap(),
            consensus,
            gas_limit: 8_000_000,
            block_interval_secs: None,
            signer_accounts: signers
                .iter()
                .map(|(fill, balance)| GenesisAccount {
                    address: account(*fill),
                    balance: *balance,
                })
                .collect(),
            prefunded_accounts: vec![],
        }
    }

    #[test]
    fn authority_round_extra_data_layout() {
        let spec = spec_with_signers(
            ConsensusKind::AuthorityRound,
            &[(0xAA, 1), (0xBB, 1), (0xCC, 1)],
        );
        let doc = GenesisBuilder::build(&spec, &[], account(0xAA), 1);

        let raw = hex::decode(doc.extra_data.trim_start_matches("0x")).unwrap();
        assert_eq!(raw.len(), 32 + 20 * 3 + 65);
        assert!(raw[..32].iter().all(|b| *b == 0));
        // signer addresses in spec order, no separators
        assert_eq!(&raw[32..52], &[0xAA; 20]);
        assert_eq!(&raw[52..72], &[0xBB; 20]);
        assert_eq!(&raw[72..92], &[0xCC; 20]);
        assert!(raw[92..].iter().all(|b| *b == 0));
        assert!(doc.validators.is_none());
    }

    #[test]
    fn bft_extra_data_is_padding_with_explicit_validators() {
        let spec = spec_with_signers(
            ConsensusKind::BftV2,
            &[(0x11, 1), (0x22, 1), (0x33, 1), (0x44, 1)],
        );
        let doc = GenesisBuilder::build(&spec, &[], account(0x11), 1);

        let raw = hex::decode(doc.extra_data.trim_start_matches("0x")).unwrap();
        assert_eq!(raw.len(), 32 + 65);
        assert!(raw.iter().all(|b| *b == 0));
        assert_eq!(
            doc.validators,
            Some(vec![account(0x11), account(0x22), account(0x33), account(0x44)])
        );
    }

    #[test]
    fn alloc_first_writer_wins() {
        let mut spec = spec_with_signers(ConsensusKind::AuthorityRound, &[(0xAA, 1000)]);
        // the signer address reappears in the prefund list with another balance
        spec.prefunded_accounts = vec![
            GenesisAccount {
                address: account(0xAA),
                balance: 7,
            },
            GenesisAccount {
                address: account(0xEE),
                balance: 42,
            },
        ];
        let doc = GenesisBuilder::build(&spec, &[], account(0xAA), 5);

        assert_eq!(doc.alloc.len(), 2);
        assert_eq!(doc.alloc[&account(0xAA)].balance, "1000");
        assert_eq!(doc.alloc[&account(0xEE)].balance, "42");
    }

    #[test]
    fn unfunded_block_producer_gets_the_default() {
        let spec = spec_with_signers(ConsensusKind::AuthorityRound, &[(0xAA, 1000)]);
        let doc = GenesisBuilder::build(&spec, &[], account(0xDD), 555);
        assert_eq!(doc.alloc[&account(0xDD)].balance, "555");
    }

    #[test]
    fn single_signer_scenario_allocates_exactly_one_entry() {
        // subnet 10.0.0.0/24, chain 9999, one signer account at 1 unit: the
        // producer is the signer, so alloc holds exactly that entry.
        let spec = spec_with_signers(
            ConsensusKind::AuthorityRound,
            &[(0xAA, 1_000_000_000_000_000_000)],
        );
        let doc = GenesisBuilder::build(&spec, &[], account(0xAA), 999);

        assert_eq!(doc.alloc.len(), 1);
        assert_eq!(
            doc.alloc[&account(0xAA)].balance,
            "1000000000000000000"
        );
        let raw = hex::decode(doc.extra_data.trim_start_matches("0x")).unwrap();
        assert_eq!(raw.len(), 32 + 20 + 65);
    }

    #[test]
    fn build_is_deterministic_and_round_trips() {
        let spec = spec_with_signers(ConsensusKind::AuthorityRound, &[(0xAA, 1000)]);
        let a = GenesisBuilder::build(&spec, &[], account(0xAA), 1);
        let b = GenesisBuilder::build(&spec, &[], account(0xAA), 1);
        assert_eq!(a, b);
        assert_eq!(a.to_json(), b.to_json());

        let parsed = GenesisDocument::from_json(&a.to_json()).unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn chain_parameters_are_copied_verbatim() {
        let mut spec = spec_with_signers(ConsensusKind::AuthorityRound, &[(0xAA, 1)]);
        spec.gas_limit = 12_345_678;
        spec.block_interval_secs = Some(13);
        let doc = GenesisBuilder::build(&spec, &[], account(0xAA), 1);
        assert_eq!(doc.chain_id, 9999);
        assert_eq!(doc.gas_limit, 12_345_678);
        assert_eq!(doc.block_interval_secs, 13);

        // interval defaults to 5 when unset
        spec.block_interval_secs = None;
        let doc = GenesisBuilder::build(&spec, &[], account(0xAA), 1);
        assert_eq!(doc.block_interval_secs, 5);
    }
}
