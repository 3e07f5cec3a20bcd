// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diff-and-apply mutation of a live topology.
//!
//! The updater validates the merged topology before touching a single
//! file, re-renders configs freely (rendering is pure), and never touches
//! genesis: changes that would require a new genesis document are rejected
//! with a distinct error so callers know to create a new network instead.

use crate::swarm::{render_all_configs, ChainSwarm, SwarmError, SwarmState};
use chainyard_config::{
    ConsensusKind, GenesisAccount, NetworkDescriptor, NodeRole, NodeSpec, TopologyValidator,
};
use chainyard_docker::ContainerRuntime;
use chainyard_types::ValidationFinding;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::info;

/// In-place property changes for one existing node.
#[derive(Clone, Debug, Default)]
pub struct NodeUpdate {
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub rpc_port: Option<u16>,
    pub peer_port: Option<u16>,
}

impl NodeUpdate {
    pub fn for_node(name: impl Into<String>) -> Self {
        NodeUpdate {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = Some(port);
        self
    }

    pub fn peer_port(mut self, port: u16) -> Self {
        self.peer_port = Some(port);
        self
    }
}

/// One batch of topology mutations.
///
/// `consensus` and `signer_accounts` exist only to be rejected: both would
/// require regenerating genesis, which the update path never does.
#[derive(Clone, Debug, Default)]
pub struct UpdatePlan {
    pub add: Vec<NodeSpec>,
    pub remove: Vec<String>,
    pub update: Vec<NodeUpdate>,
    pub consensus: Option<ConsensusKind>,
    pub signer_accounts: Option<Vec<GenesisAccount>>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    /// Start (or restart into) the updated topology once persistence
    /// succeeds.
    pub start_after_update: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateResult {
    pub nodes_added: usize,
    pub nodes_removed: usize,
    pub nodes_updated: usize,
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The requested change can only be expressed as a new network
    /// (new name and chain id); genesis is immutable once created.
    #[error("changing the {0} would regenerate genesis; create a new network instead")]
    GenesisImmutable(&'static str),
    #[error("merged topology rejected: {}", chainyard_types::validation::report(.0))]
    InvalidTopology(Vec<ValidationFinding>),
    #[error("node {0:?} does not exist in this network")]
    UnknownNode(String),
    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

/// Applies [`UpdatePlan`]s to a provisioned swarm.
pub struct TopologyUpdater<'a, R> {
    swarm: &'a mut ChainSwarm<R>,
}

impl<'a, R: ContainerRuntime> TopologyUpdater<'a, R> {
    pub fn new(swarm: &'a mut ChainSwarm<R>) -> Self {
        TopologyUpdater { swarm }
    }

    /// Validates the whole plan against the merged topology before any
    /// file moves. On success: removed nodes lose their config and
    /// identity, added nodes gain both, and every surviving config is
    /// re-rendered so bootstrap address changes propagate to the peers
    /// that cache them.
    pub fn apply(
        &mut self,
        plan: &UpdatePlan,
        options: UpdateOptions,
    ) -> Result<UpdateResult, UpdateError> {
        match self.swarm.state {
            SwarmState::Unprovisioned | SwarmState::Destroyed => {
                return Err(SwarmError::WrongState {
                    network: self.swarm.spec.name.clone(),
                    state: self.swarm.state,
                    action: "apply updates to",
                }
                .into());
            }
            _ => {}
        }

        if plan.consensus.is_some() {
            return Err(UpdateError::GenesisImmutable("consensus kind"));
        }
        if plan.signer_accounts.is_some() {
            return Err(UpdateError::GenesisImmutable("signer account set"));
        }

        // Build the candidate topology in memory first; nothing on disk
        // moves until it validates.
        let mut nodes = self.swarm.nodes.clone();

        for name in &plan.remove {
            let position = nodes
                .iter()
                .position(|n| &n.name == name)
                .ok_or_else(|| UpdateError::UnknownNode(name.clone()))?;
            nodes.remove(position);
        }

        for update in &plan.update {
            let node = nodes
                .iter_mut()
                .find(|n| n.name == update.name)
                .ok_or_else(|| UpdateError::UnknownNode(update.name.clone()))?;
            if let Some(ip) = update.ip {
                node.ip = ip;
            }
            if let Some(port) = update.rpc_port {
                node.rpc_port = port;
            }
            if let Some(port) = update.peer_port {
                node.peer_port = port;
            }
        }

        nodes.extend(plan.add.iter().cloned());

        // The network's own descriptor is on disk already; uniqueness
        // checks must compare against the *other* tracked networks.
        let tracked: Vec<_> = self
            .swarm
            .store
            .list_tracked()
            .map_err(SwarmError::from)?
            .into_iter()
            .filter(|t| t.name != self.swarm.spec.name)
            .collect();
        let findings = TopologyValidator::validate(&self.swarm.spec, &nodes, &tracked);
        if !findings.is_empty() {
            return Err(UpdateError::InvalidTopology(findings));
        }

        // Validation passed: persist. Removed nodes first so a re-added
        // name gets a fresh identity rather than a stale one.
        let key_manager = self.swarm.key_manager();
        for name in &plan.remove {
            self.swarm
                .store
                .remove_node(&self.swarm.spec.name, name)
                .map_err(SwarmError::from)?;
        }

        // identity_for re-derives connection URIs for moved nodes and
        // mints keys for added ones; unaffected nodes load unchanged.
        let mut identities = std::collections::BTreeMap::new();
        for node in &nodes {
            let identity = key_manager
                .identity_for(&node.name, node.ip, node.peer_port)
                .map_err(SwarmError::from)?;
            identities.insert(node.name.clone(), identity);
        }

        render_all_configs(&self.swarm.store, &self.swarm.spec, &nodes, &identities)
            .map_err(SwarmError::from)?;

        let associations = carry_associations(self.swarm, &nodes);
        self.swarm
            .store
            .save_descriptor(&NetworkDescriptor {
                spec: self.swarm.spec.clone(),
                nodes: nodes.clone(),
                signer_associations: associations.clone(),
            })
            .map_err(SwarmError::from)?;

        let result = UpdateResult {
            nodes_added: plan.add.len(),
            nodes_removed: plan.remove.len(),
            nodes_updated: plan.update.len(),
            success: true,
        };
        self.swarm.nodes = nodes;
        self.swarm.associations = associations;
        info!(
            network = %self.swarm.spec.name,
            added = result.nodes_added,
            removed = result.nodes_removed,
            updated = result.nodes_updated,
            "topology updated"
        );

        if options.start_after_update {
            self.swarm.start()?;
        }
        Ok(result)
    }
}

/// Surviving associations keep their account; new signer nodes claim the
/// unused signer accounts in spec order. The pairing of an existing signer
/// node never silently moves to another account.
fn carry_associations<R>(
    swarm: &ChainSwarm<R>,
    nodes: &[NodeSpec],
) -> Vec<chainyard_config::SignerAssociation> {
    let mut associations = swarm.associations.clone();
    associations.retain(|a| nodes.iter().any(|n| n.name == a.node_name));

    let used: std::collections::HashSet<_> = associations.iter().map(|a| a.account).collect();
    let mut free = swarm
        .spec
        .signer_accounts
        .iter()
        .map(|a| a.address)
        .filter(|a| !used.contains(a));
    for node in nodes.iter().filter(|n| n.role == NodeRole::Signer) {
        if associations.iter().any(|a| a.node_name == node.name) {
            continue;
        }
        // validation already guaranteed enough unused accounts exist
        if let Some(account) = free.next() {
            associations.push(chainyard_config::SignerAssociation {
                node_name: node.name.clone(),
                account,
            });
        }
    }
    associations
}
