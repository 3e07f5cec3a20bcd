// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, net::Ipv4Addr, str::FromStr};

/// Well-known default peer (discovery/devp2p) port.
pub const DEFAULT_PEER_PORT: u16 = 30303;

/// What a node does for the network.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Peer-discovery entry point; its enode is baked into other configs.
    Bootstrap,
    /// Produces blocks with an associated signer account.
    Signer,
    /// Serves read queries only.
    Query,
    /// Relays consensus traffic without producing blocks (BFT validator).
    Relay,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            NodeRole::Bootstrap => "bootstrap",
            NodeRole::Signer => "signer",
            NodeRole::Query => "query",
            NodeRole::Relay => "relay",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(NodeRole::Bootstrap),
            "signer" => Ok(NodeRole::Signer),
            "query" => Ok(NodeRole::Query),
            "relay" => Ok(NodeRole::Relay),
            _ => Err(format!("invalid node role: {}", s)),
        }
    }
}

impl NodeRole {
    /// Launch order during start-up: bootstrap nodes come up before the
    /// nodes that discover peers through them.
    pub fn launch_rank(&self) -> u8 {
        match self {
            NodeRole::Bootstrap => 0,
            NodeRole::Signer => 1,
            NodeRole::Query | NodeRole::Relay => 2,
        }
    }
}

fn default_peer_port() -> u16 {
    DEFAULT_PEER_PORT
}

/// One node of a network topology.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeSpec {
    pub name: String,
    pub ip: Ipv4Addr,
    pub rpc_port: u16,
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    pub role: NodeRole,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, rpc_port: u16, role: NodeRole) -> Self {
        NodeSpec {
            name: name.into(),
            ip,
            rpc_port,
            peer_port: DEFAULT_PEER_PORT,
            role,
        }
    }

    pub fn with_peer_port(mut self, peer_port: u16) -> Self {
        self.peer_port = peer_port;
        self
    }
}
