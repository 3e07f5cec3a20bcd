// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Per-node cryptographic identity management.
//!
//! Every node owns one secp256k1 keypair for its whole life. The account
//! address and the enode URI are derived views: the address never changes,
//! and the URI is re-derived whenever the node's network endpoint moves.
//! The private key is the durable identity.

use chainyard_types::AccountAddress;
use k256::{
    ecdsa::SigningKey,
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Error)]
pub enum KeyManagerError {
    #[error("storage error for node {node}: {source}")]
    Storage {
        node: String,
        #[source]
        source: std::io::Error,
    },
    #[error("identity bundle for node {node} is not valid JSON: {source}")]
    Corrupt {
        node: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("identity bundle for node {node} holds invalid key material")]
    BadKeyMaterial { node: String },
}

/// The persisted identity bundle of a single node.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeIdentity {
    /// Hex-encoded secp256k1 secret scalar, `0x` + 64 digits.
    pub private_key: String,
    /// Hex-encoded uncompressed public key body (64 bytes, no tag byte).
    pub public_key: String,
    pub address: AccountAddress,
    pub enode: String,
}

impl NodeIdentity {
    /// Generates a fresh keypair and derives its address and enode URI.
    pub fn generate(ip: Ipv4Addr, peer_port: u16) -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_signing_key(&signing_key, ip, peer_port)
    }

    fn from_signing_key(signing_key: &SigningKey, ip: Ipv4Addr, peer_port: u16) -> Self {
        let point = signing_key.verifying_key().to_encoded_point(false);
        // Strip the 0x04 uncompressed-point tag.
        let public_key_body = &point.as_bytes()[1..];
        let address = AccountAddress::from_public_key_bytes(public_key_body);
        let public_key = hex::encode(public_key_body);
        NodeIdentity {
            private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
            enode: enode_uri(&public_key, ip, peer_port),
            public_key,
            address,
        }
    }

    /// The same identity with its connection URI re-derived for a new
    /// endpoint. Key material and address are untouched.
    pub fn with_endpoint(&self, ip: Ipv4Addr, peer_port: u16) -> Self {
        NodeIdentity {
            enode: enode_uri(&self.public_key, ip, peer_port),
            ..self.clone()
        }
    }
}

/// Builds the peer-connection URI other nodes dial this node with.
pub fn enode_uri(public_key_hex: &str, ip: Ipv4Addr, peer_port: u16) -> String {
    format!("enode://{}@{}:{}", public_key_hex, ip, peer_port)
}

/// Loads and persists [`NodeIdentity`] bundles under an injected storage
/// root, one directory per node name.
pub struct KeyManager {
    storage_root: PathBuf,
}

impl KeyManager {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        KeyManager {
            storage_root: storage_root.into(),
        }
    }

    fn identity_path(&self, node_name: &str) -> PathBuf {
        self.storage_root.join(node_name).join(IDENTITY_FILE)
    }

    /// Returns the identity for `node_name`, generating and persisting a
    /// fresh one if none exists yet.
    ///
    /// When a persisted identity's enode no longer matches the URI derived
    /// from the current endpoint, the URI is re-derived and the update
    /// persisted; the keypair and address survive unchanged.
    pub fn identity_for(
        &self,
        node_name: &str,
        ip: Ipv4Addr,
        peer_port: u16,
    ) -> Result<NodeIdentity, KeyManagerError> {
        let path = self.identity_path(node_name);
        if path.exists() {
            let identity = self.load(node_name, &path)?;
            let current = identity.with_endpoint(ip, peer_port);
            if current.enode != identity.enode {
                info!(
                    node = node_name,
                    enode = %current.enode,
                    "node endpoint moved, re-deriving connection URI"
                );
                self.save(node_name, &path, &current)?;
            }
            return Ok(current);
        }

        let identity = NodeIdentity::generate(ip, peer_port);
        debug!(
            node = node_name,
            account = %identity.address.short_str(),
            "generated fresh identity"
        );
        self.save(node_name, &path, &identity)?;
        Ok(identity)
    }

    /// Drops the persisted identity of a removed node. Missing bundles are
    /// a no-op so removal can be retried.
    pub fn remove(&self, node_name: &str) -> Result<(), KeyManagerError> {
        let path = self.identity_path(node_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyManagerError::Storage {
                node: node_name.to_string(),
                source: e,
            }),
        }
    }

    fn load(&self, node_name: &str, path: &Path) -> Result<NodeIdentity, KeyManagerError> {
        let contents = fs::read_to_string(path).map_err(|e| KeyManagerError::Storage {
            node: node_name.to_string(),
            source: e,
        })?;
        let identity: NodeIdentity =
            serde_json::from_str(&contents).map_err(|e| KeyManagerError::Corrupt {
                node: node_name.to_string(),
                source: e,
            })?;
        // A bundle whose secret scalar no longer parses cannot sign for the
        // node; refuse it rather than silently regenerate.
        let raw = identity
            .private_key
            .strip_prefix("0x")
            .and_then(|h| hex::decode(h).ok())
            .ok_or_else(|| KeyManagerError::BadKeyMaterial {
                node: node_name.to_string(),
            })?;
        SigningKey::from_slice(&raw).map_err(|_| KeyManagerError::BadKeyMaterial {
            node: node_name.to_string(),
        })?;
        Ok(identity)
    }

    fn save(
        &self,
        node_name: &str,
        path: &Path,
        identity: &NodeIdentity,
    ) -> Result<(), KeyManagerError> {
        let storage = |source| KeyManagerError::Storage {
            node: node_name.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        let contents =
            serde_json::to_string_pretty(identity).expect("identity bundles always serialize");
        fs::write(path, contents).map_err(storage)
    }
}
