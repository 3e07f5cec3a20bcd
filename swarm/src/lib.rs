// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The network orchestration facade.
//!
//! [`swarm::ChainSwarm`] drives a network through its lifecycle
//! (`Unprovisioned -> Created -> Running <-> Stopped -> Destroyed`) and
//! [`update::TopologyUpdater`] mutates a provisioned topology without ever
//! touching genesis.

pub mod swarm;
pub mod update;

pub use crate::swarm::{ChainSwarm, NodeConnectivity, SwarmError, SwarmOptions, SwarmState};
pub use crate::update::{
    NodeUpdate, TopologyUpdater, UpdateError, UpdateOptions, UpdatePlan, UpdateResult,
};
