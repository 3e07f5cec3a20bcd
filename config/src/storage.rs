// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persisted state layout, one directory per network under an injected
//! storage root:
//!
//! ```text
//! <root>/<network>/descriptor.json      network spec + nodes + associations
//! <root>/<network>/genesis.json         written once at creation
//! <root>/<network>/logs/<node>.log      container log capture
//! <root>/<network>/<node>/node.toml     rendered runtime config
//! <root>/<network>/<node>/identity.json owned by the key manager
//! ```
//!
//! The descriptor is the single source of truth consulted by every update
//! operation.

use crate::{
    network_spec::{NetworkSpec, SignerAssociation},
    node_config::NodeConfig,
    node_spec::NodeSpec,
    validator::TrackedNetwork,
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::warn;

const DESCRIPTOR_FILE: &str = "descriptor.json";
const GENESIS_FILE: &str = "genesis.json";
const NODE_CONFIG_FILE: &str = "node.toml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} holds invalid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("network {0:?} is not tracked by this store")]
    UnknownNetwork(String),
    #[error("genesis for network {0:?} already exists; genesis is written exactly once")]
    GenesisExists(String),
}

/// Everything durable about one network.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetworkDescriptor {
    pub spec: NetworkSpec,
    pub nodes: Vec<NodeSpec>,
    pub signer_associations: Vec<SignerAssociation>,
}

/// File-backed store for network descriptors, genesis documents and
/// rendered node configs.
#[derive(Clone, Debug)]
pub struct NetworkStore {
    root: PathBuf,
}

impl NetworkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        NetworkStore { root: root.into() }
    }

    pub fn network_root(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    pub fn node_dir(&self, network: &str, node: &str) -> PathBuf {
        self.network_root(network).join(node)
    }

    pub fn node_config_path(&self, network: &str, node: &str) -> PathBuf {
        self.node_dir(network, node).join(NODE_CONFIG_FILE)
    }

    pub fn genesis_path(&self, network: &str) -> PathBuf {
        self.network_root(network).join(GENESIS_FILE)
    }

    pub fn logs_dir(&self, network: &str) -> PathBuf {
        self.network_root(network).join("logs")
    }

    fn descriptor_path(&self, network: &str) -> PathBuf {
        self.network_root(network).join(DESCRIPTOR_FILE)
    }

    fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn descriptor_exists(&self, network: &str) -> bool {
        self.descriptor_path(network).exists()
    }

    pub fn save_descriptor(&self, descriptor: &NetworkDescriptor) -> Result<(), StoreError> {
        let path = self.descriptor_path(&descriptor.spec.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::io_err(&path))?;
        }
        let contents = serde_json::to_string_pretty(descriptor)
            .expect("network descriptors always serialize");
        fs::write(&path, contents).map_err(Self::io_err(&path))
    }

    pub fn load_descriptor(&self, network: &str) -> Result<NetworkDescriptor, StoreError> {
        let path = self.descriptor_path(network);
        if !path.exists() {
            return Err(StoreError::UnknownNetwork(network.to_string()));
        }
        let contents = fs::read_to_string(&path).map_err(Self::io_err(&path))?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Json { path, source })
    }

    /// Networks visible to uniqueness validation. Directories without a
    /// readable descriptor are skipped with a warning rather than failing
    /// the scan.
    pub fn list_tracked(&self) -> Result<Vec<TrackedNetwork>, StoreError> {
        let mut tracked = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tracked),
            Err(e) => return Err(Self::io_err(&self.root)(e)),
        };
        for entry in entries {
            let entry = entry.map_err(Self::io_err(&self.root))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.path().join(DESCRIPTOR_FILE).exists() {
                continue;
            }
            match self.load_descriptor(&name) {
                Ok(descriptor) => tracked.push(TrackedNetwork {
                    name: descriptor.spec.name,
                    chain_id: descriptor.spec.chain_id,
                    subnet: descriptor.spec.subnet,
                }),
                Err(e) => warn!(network = %name, error = %e, "skipping unreadable descriptor"),
            }
        }
        Ok(tracked)
    }

    /// Persists the genesis document. Genesis is immutable: a second write
    /// for the same network is an error, not an overwrite.
    pub fn write_genesis_once(&self, network: &str, genesis_json: &str) -> Result<(), StoreError> {
        let path = self.genesis_path(network);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::io_err(&path))?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        match options.open(&path) {
            Ok(mut file) => {
                use io::Write;
                file.write_all(genesis_json.as_bytes())
                    .map_err(Self::io_err(&path))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::GenesisExists(network.to_string()))
            }
            Err(e) => Err(Self::io_err(&path)(e)),
        }
    }

    pub fn read_genesis(&self, network: &str) -> Result<String, StoreError> {
        let path = self.genesis_path(network);
        fs::read_to_string(&path).map_err(Self::io_err(&path))
    }

    pub fn save_node_config(
        &self,
        network: &str,
        node: &str,
        config: &NodeConfig,
    ) -> Result<(), StoreError> {
        let path = self.node_config_path(network, node);
        config.save(&path).map_err(Self::io_err(&path))
    }

    pub fn load_node_config(&self, network: &str, node: &str) -> Result<NodeConfig, StoreError> {
        let path = self.node_config_path(network, node);
        NodeConfig::load(&path).map_err(Self::io_err(&path))
    }

    /// Removes a node's directory (config and identity). Already-absent
    /// directories are a no-op so removal can be retried.
    pub fn remove_node(&self, network: &str, node: &str) -> Result<(), StoreError> {
        let dir = self.node_dir(network, node);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(&dir)(e)),
        }
    }

    /// Removes everything persisted for a network. Idempotent.
    pub fn remove_network(&self, network: &str) -> Result<(), StoreError> {
        let dir = self.network_root(network);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(&dir)(e)),
        }
    }
}
