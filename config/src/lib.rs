// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Network and node descriptors, the topology validation pipeline, the
//! per-node runtime-config renderer, and the persisted network store.

pub mod network_spec;
pub mod node_config;
pub mod node_spec;
pub mod storage;
pub mod validator;

pub use network_spec::{ConsensusKind, GenesisAccount, NetworkSpec, SignerAssociation};
pub use node_config::NodeConfig;
pub use node_spec::{NodeRole, NodeSpec, DEFAULT_PEER_PORT};
pub use storage::{NetworkDescriptor, NetworkStore, StoreError};
pub use validator::{TopologyValidator, TrackedNetwork};

#[cfg(test)]
mod unit_tests;
