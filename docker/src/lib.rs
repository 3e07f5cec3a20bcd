// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The narrow interface between the orchestrator and the container runtime.
//!
//! Everything the core needs from a backend is expressed by
//! [`ContainerRuntime`]; the default implementation shells out to the
//! `docker` CLI, and tests swap in the in-memory fake. Cleanup operations
//! (stop, remove) are idempotent by contract: an already-absent target is a
//! no-op so partially-cleaned states can always be retried.

use chainyard_types::Ipv4Cidr;
use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub mod cli;
pub mod subnet;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use cli::DockerCli;

/// Label keys attached to every launched container so nodes can be found
/// again by network and role.
pub const LABEL_NETWORK: &str = "chainyard.network";
pub const LABEL_ROLE: &str = "chainyard.role";
pub const LABEL_RPC_PORT: &str = "chainyard.rpc-port";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command:?} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("unexpected output from {command:?}: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Everything needed to materialize one node as a container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub ip: Ipv4Addr,
    pub labels: BTreeMap<String, String>,
    /// Host-path to container-path bind mounts.
    pub volumes: Vec<(PathBuf, String)>,
    /// Ports published to the host, container port = host port.
    pub published_ports: Vec<u16>,
    pub command: Vec<String>,
}

/// Container and network lifecycle, as narrow as the orchestrator needs.
pub trait ContainerRuntime {
    fn create_network(&self, name: &str, subnet: &Ipv4Cidr) -> Result<(), RuntimeError>;

    fn network_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    /// The subnets currently claimed by any network on this host, used for
    /// conflict detection before creating a new one.
    fn claimed_subnets(&self) -> Result<Vec<Ipv4Cidr>, RuntimeError>;

    /// Removes a network. Absent networks are a no-op.
    fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Starts a container and returns its runtime id.
    fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Stops a container. Absent containers are a no-op.
    fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Force-removes a container. Absent containers are a no-op.
    fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Names of all containers labeled with the given network, running or
    /// stopped.
    fn list_containers(&self, network: &str) -> Result<Vec<String>, RuntimeError>;

    /// Writes the container's captured output to `path`.
    fn capture_logs(&self, name: &str, path: &Path) -> Result<(), RuntimeError>;
}
