// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! The topology validation pipeline.
//!
//! Validation is a pure function from (network spec, node set, locally
//! tracked networks) to a list of findings. Business-rule violations are
//! never raised as errors; every rule runs and every violation is collected
//! so the caller can surface one aggregated report. An empty list is the
//! only green light to provision.

use crate::{
    network_spec::{ConsensusKind, NetworkSpec},
    node_spec::{NodeRole, NodeSpec},
};
use chainyard_types::{
    validation::{FindingCategory, ValidationFinding},
    AccountAddress, ChainId, Ipv4Cidr,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Balance ceiling per genesis account. A stability guard for the whole
/// network, not a protocol limit.
pub const MAX_ACCOUNT_BALANCE: u128 = 100_000_000_000_000_000_000_000_000_000_000; // 10^32

/// Ports owned by well-known services; a node config claiming one is almost
/// certainly a mistake. Ports below 1024 are rejected wholesale.
pub const RESERVED_PORTS: &[u16] = &[3306, 5432, 5672, 6379, 9200, 11211, 27017];

/// Smallest BFT cluster that can tolerate one faulty validator.
pub const MIN_BFT_VALIDATORS: usize = 4;

/// Authority-round clusters beyond this size see degraded block times.
pub const MAX_AURA_NODES: usize = 20;

/// BFT message complexity makes clusters beyond this size impractical.
pub const MAX_BFT_VALIDATORS: usize = 100;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("static pattern compiles"));

/// A network already provisioned on this host, as far as uniqueness checks
/// are concerned.
#[derive(Clone, Debug)]
pub struct TrackedNetwork {
    pub name: String,
    pub chain_id: ChainId,
    pub subnet: Ipv4Cidr,
}

pub struct TopologyValidator;

impl TopologyValidator {
    /// Validates a prospective topology. Returns every finding; empty means
    /// the topology is safe to provision.
    pub fn validate(
        spec: &NetworkSpec,
        nodes: &[NodeSpec],
        tracked: &[TrackedNetwork],
    ) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        check_network_identity(spec, tracked, &mut findings);
        check_node_formats(nodes, &mut findings);
        check_node_uniqueness(nodes, &mut findings);
        check_subnet_membership(spec, nodes, &mut findings);
        check_consensus_rules(spec, nodes, &mut findings);
        check_accounts(spec, &mut findings);
        findings
    }
}

fn finding(
    field: impl Into<String>,
    category: FindingCategory,
    message: impl Into<String>,
) -> ValidationFinding {
    ValidationFinding::new(field, category, message)
}

fn check_network_identity(
    spec: &NetworkSpec,
    tracked: &[TrackedNetwork],
    findings: &mut Vec<ValidationFinding>,
) {
    if !NAME_PATTERN.is_match(&spec.name) {
        findings.push(finding(
            "network.name",
            FindingCategory::Malformed,
            format!(
                "{:?} is not a valid network name (lowercase alphanumerics, - and _, max 64 chars)",
                spec.name
            ),
        ));
    }

    if spec.chain_id.is_reserved() {
        findings.push(finding(
            "network.chainId",
            FindingCategory::Duplicate,
            format!("chain id {} is claimed by a public network", spec.chain_id),
        ));
    }

    if spec.gas_limit == 0 {
        findings.push(finding(
            "network.gasLimit",
            FindingCategory::OutOfRange,
            "gas limit must be positive",
        ));
    }

    if spec.block_interval_secs == Some(0) {
        findings.push(finding(
            "network.blockIntervalSecs",
            FindingCategory::OutOfRange,
            "block interval must be at least one second",
        ));
    }

    // /31 and /32 leave no assignable host addresses beyond the gateway
    if spec.subnet.prefix_len() > 30 {
        findings.push(finding(
            "network.subnet",
            FindingCategory::OutOfRange,
            format!("subnet {} has no room for node addresses", spec.subnet),
        ));
    }

    for other in tracked {
        if other.name == spec.name {
            findings.push(finding(
                "network.name",
                FindingCategory::Duplicate,
                format!("a network named {:?} is already tracked", spec.name),
            ));
        }
        if other.chain_id == spec.chain_id {
            findings.push(finding(
                "network.chainId",
                FindingCategory::Duplicate,
                format!(
                    "chain id {} is already used by tracked network {:?}",
                    spec.chain_id, other.name
                ),
            ));
        }
        if other.subnet.overlaps(&spec.subnet) {
            findings.push(finding(
                "network.subnet",
                FindingCategory::Duplicate,
                format!(
                    "subnet {} overlaps {} of tracked network {:?}",
                    spec.subnet, other.subnet, other.name
                ),
            ));
        }
    }
}

fn check_node_formats(nodes: &[NodeSpec], findings: &mut Vec<ValidationFinding>) {
    for (i, node) in nodes.iter().enumerate() {
        if !NAME_PATTERN.is_match(&node.name) {
            findings.push(finding(
                format!("nodes[{}].name", i),
                FindingCategory::Malformed,
                format!("{:?} is not a valid node name", node.name),
            ));
        }

        for (field, port) in &[("rpcPort", node.rpc_port), ("peerPort", node.peer_port)] {
            if *port < 1024 {
                findings.push(finding(
                    format!("nodes[{}].{}", i, field),
                    FindingCategory::OutOfRange,
                    format!("port {} is in the privileged range", port),
                ));
            } else if RESERVED_PORTS.contains(port) {
                findings.push(finding(
                    format!("nodes[{}].{}", i, field),
                    FindingCategory::OutOfRange,
                    format!("port {} belongs to a well-known service", port),
                ));
            }
        }

        if node.rpc_port == node.peer_port {
            findings.push(finding(
                format!("nodes[{}].peerPort", i),
                FindingCategory::StructurallyInvalid,
                "rpc port and peer port must differ",
            ));
        }
    }
}

fn check_node_uniqueness(nodes: &[NodeSpec], findings: &mut Vec<ValidationFinding>) {
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut endpoints: HashMap<(std::net::Ipv4Addr, u16), String> = HashMap::new();

    for (i, node) in nodes.iter().enumerate() {
        if let Some(first) = names.insert(&node.name, i) {
            findings.push(finding(
                format!("nodes[{}].name", i),
                FindingCategory::Duplicate,
                format!(
                    "node name {:?} already used by nodes[{}]",
                    node.name, first
                ),
            ));
        }

        for (field, port) in &[("rpcPort", node.rpc_port), ("peerPort", node.peer_port)] {
            let key = (node.ip, *port);
            let label = format!("nodes[{}].{}", i, field);
            if let Some(first) = endpoints.get(&key) {
                findings.push(finding(
                    label,
                    FindingCategory::Duplicate,
                    format!("endpoint {}:{} already claimed by {}", node.ip, port, first),
                ));
            } else {
                endpoints.insert(key, format!("nodes[{}].{}", i, field));
            }
        }
    }
}

fn check_subnet_membership(
    spec: &NetworkSpec,
    nodes: &[NodeSpec],
    findings: &mut Vec<ValidationFinding>,
) {
    let subnet = &spec.subnet;
    for (i, node) in nodes.iter().enumerate() {
        let field = format!("nodes[{}].ip", i);
        if !subnet.contains(node.ip) {
            findings.push(finding(
                field,
                FindingCategory::OutOfRange,
                format!("{} lies outside subnet {}", node.ip, subnet),
            ));
            continue;
        }
        if node.ip == subnet.network_address()
            || node.ip == subnet.broadcast_address()
            || node.ip == subnet.gateway_address()
        {
            findings.push(finding(
                field,
                FindingCategory::OutOfRange,
                format!(
                    "{} is a reserved address (network/gateway/broadcast) of {}",
                    node.ip, subnet
                ),
            ));
        }
    }

    // Coherence heuristic: addresses scattered across /24 segments usually
    // mean a typo in one of them.
    let segments: HashSet<[u8; 3]> = nodes
        .iter()
        .filter(|n| subnet.contains(n.ip))
        .map(|n| {
            let o = n.ip.octets();
            [o[0], o[1], o[2]]
        })
        .collect();
    if segments.len() > 1 {
        findings.push(finding(
            "nodes",
            FindingCategory::StructurallyInvalid,
            "node addresses span multiple /24 segments",
        ));
    }
}

fn check_consensus_rules(
    spec: &NetworkSpec,
    nodes: &[NodeSpec],
    findings: &mut Vec<ValidationFinding>,
) {
    if nodes.is_empty() {
        findings.push(finding(
            "nodes",
            FindingCategory::MissingRequired,
            "topology has no nodes",
        ));
        return;
    }

    let count_role = |role: NodeRole| nodes.iter().filter(|n| n.role == role).count();
    let bootstraps = count_role(NodeRole::Bootstrap);
    let signers = count_role(NodeRole::Signer);
    let relays = count_role(NodeRole::Relay);

    if bootstraps == 0 {
        findings.push(finding(
            "nodes",
            FindingCategory::MissingRequired,
            "at least one bootstrap node is required for peer discovery",
        ));
    }

    if bootstraps == nodes.len() {
        findings.push(finding(
            "nodes",
            FindingCategory::StructurallyInvalid,
            "topology consists only of bootstrap nodes; nothing would produce or serve blocks",
        ));
    }

    match spec.consensus {
        ConsensusKind::AuthorityRound => {
            if signers == 0 {
                findings.push(finding(
                    "nodes",
                    FindingCategory::MissingRequired,
                    "authority-round requires at least one signer node",
                ));
            }
            if signers == 2 {
                findings.push(finding(
                    "nodes",
                    FindingCategory::StructurallyInvalid,
                    "exactly two signers risk a permanent split on disagreement",
                ));
            }
            if signers > 0 && signers % 2 == 0 {
                findings.push(finding(
                    "nodes",
                    FindingCategory::StructurallyInvalid,
                    format!(
                        "an even signer count ({}) cannot form a stable majority",
                        signers
                    ),
                ));
            }
            if nodes.len() > MAX_AURA_NODES {
                findings.push(finding(
                    "nodes",
                    FindingCategory::OutOfRange,
                    format!(
                        "{} nodes exceed the recommended authority-round maximum of {}",
                        nodes.len(),
                        MAX_AURA_NODES
                    ),
                ));
            }
            if signers != spec.signer_accounts.len() {
                findings.push(finding(
                    "network.signerAccounts",
                    FindingCategory::StructurallyInvalid,
                    format!(
                        "authority-round needs a one-to-one pairing of signer nodes and \
                         signer accounts, got {} nodes and {} accounts",
                        signers,
                        spec.signer_accounts.len()
                    ),
                ));
            }
        }
        ConsensusKind::BftV1 | ConsensusKind::BftV2 => {
            let validators = signers + relays;
            if validators < MIN_BFT_VALIDATORS {
                findings.push(finding(
                    "nodes",
                    FindingCategory::MissingRequired,
                    format!(
                        "byzantine fault tolerance requires at least {} validators \
                         (signer + relay), got {}",
                        MIN_BFT_VALIDATORS, validators
                    ),
                ));
            }
            let fault_tolerance = validators.saturating_sub(1) / 3;
            if fault_tolerance == 0 && validators > 1 {
                findings.push(finding(
                    "nodes",
                    FindingCategory::StructurallyInvalid,
                    format!(
                        "{} validators cannot tolerate a single faulty node (f = 0)",
                        validators
                    ),
                ));
            }
            if signers == 0 {
                findings.push(finding(
                    "nodes",
                    FindingCategory::MissingRequired,
                    "at least one signer node is required to actually produce blocks",
                ));
            }
            if validators > MAX_BFT_VALIDATORS {
                findings.push(finding(
                    "nodes",
                    FindingCategory::OutOfRange,
                    format!(
                        "{} validators exceed the practical BFT maximum of {}",
                        validators, MAX_BFT_VALIDATORS
                    ),
                ));
            }
            if signers > spec.signer_accounts.len() {
                findings.push(finding(
                    "network.signerAccounts",
                    FindingCategory::MissingRequired,
                    format!(
                        "{} signer nodes need at least as many signer accounts, got {}",
                        signers,
                        spec.signer_accounts.len()
                    ),
                ));
            }
        }
    }
}

fn check_accounts(spec: &NetworkSpec, findings: &mut Vec<ValidationFinding>) {
    let mut seen: HashMap<AccountAddress, String> = HashMap::new();
    let accounts = spec
        .signer_accounts
        .iter()
        .enumerate()
        .map(|(i, a)| (format!("network.signerAccounts[{}]", i), a))
        .chain(
            spec.prefunded_accounts
                .iter()
                .enumerate()
                .map(|(i, a)| (format!("network.prefundedAccounts[{}]", i), a)),
        );

    for (field, account) in accounts {
        if account.address == AccountAddress::default() {
            findings.push(finding(
                format!("{}.address", field),
                FindingCategory::Malformed,
                "the zero address cannot hold a genesis balance",
            ));
        }
        if let Some(first) = seen.insert(account.address, field.clone()) {
            findings.push(finding(
                format!("{}.address", field),
                FindingCategory::Duplicate,
                format!("address {} already listed at {}", account.address, first),
            ));
        }
        if account.balance == 0 {
            findings.push(finding(
                format!("{}.balance", field),
                FindingCategory::OutOfRange,
                "genesis balance must be a positive integer",
            ));
        } else if account.balance > MAX_ACCOUNT_BALANCE {
            findings.push(finding(
                format!("{}.balance", field),
                FindingCategory::OutOfRange,
                format!("genesis balance exceeds the sanity cap of {}", MAX_ACCOUNT_BALANCE),
            ));
        }
    }

    if spec.signer_accounts.len() > spec.consensus.max_signers() {
        findings.push(finding(
            "network.signerAccounts",
            FindingCategory::OutOfRange,
            format!(
                "{} signer accounts exceed the {} cap for {}",
                spec.signer_accounts.len(),
                spec.consensus.max_signers(),
                spec.consensus
            ),
        ));
    }
}
