// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    network_spec::NetworkSpec,
    node_spec::{NodeRole, NodeSpec},
};
use chainyard_key_manager::NodeIdentity;
use chainyard_types::AccountAddress;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

/// The runtime configuration handed to one node process.
///
/// Rendering is a pure function of the node spec, the network spec and the
/// current bootstrap set; re-rendering at any time yields the same document
/// for the same inputs, which is what lets the update path regenerate
/// configs freely without touching genesis.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub chain: ChainSection,
    pub network: NetworkSection,
    pub rpc: RpcSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mining: Option<MiningSection>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeSection {
    pub name: String,
    pub role: NodeRole,
    pub data_dir: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChainSection {
    pub chain_id: u64,
    pub genesis_file: String,
    pub block_interval_secs: u64,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkSection {
    pub listen_address: String,
    /// Peer-discovery entry points. Every non-bootstrap node carries the
    /// full bootstrap set; bootstrap nodes carry their siblings.
    pub bootnodes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RpcSection {
    pub address: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MiningSection {
    pub enabled: bool,
    pub coinbase: AccountAddress,
}

/// In-container paths; host paths are bind-mounted onto these.
pub const CONTAINER_DATA_DIR: &str = "/data";
pub const CONTAINER_GENESIS_FILE: &str = "/data/genesis.json";

impl NodeConfig {
    /// Renders the config for `node`. `bootstrap_uris` is the enode list of
    /// every bootstrap node in the network, in topology order.
    pub fn render(
        node: &NodeSpec,
        spec: &NetworkSpec,
        identity: &NodeIdentity,
        bootstrap_uris: &[String],
    ) -> NodeConfig {
        // A bootstrap node must not dial itself.
        let bootnodes = bootstrap_uris
            .iter()
            .filter(|uri| **uri != identity.enode)
            .cloned()
            .collect();

        let mining = if node.role == NodeRole::Signer {
            Some(MiningSection {
                enabled: true,
                coinbase: identity.address,
            })
        } else {
            None
        };

        NodeConfig {
            node: NodeSection {
                name: node.name.clone(),
                role: node.role,
                data_dir: CONTAINER_DATA_DIR.to_string(),
            },
            chain: ChainSection {
                chain_id: spec.chain_id.id(),
                genesis_file: CONTAINER_GENESIS_FILE.to_string(),
                block_interval_secs: spec.block_interval_secs(),
            },
            network: NetworkSection {
                listen_address: format!("{}:{}", node.ip, node.peer_port),
                bootnodes,
            },
            rpc: RpcSection {
                address: format!("{}:{}", node.ip, node.rpc_port),
            },
            mining,
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string(self).expect("node configs always serialize")
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml())
    }

    pub fn load(path: &Path) -> io::Result<NodeConfig> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
