// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use chainyard_config::{
    NetworkDescriptor, NetworkSpec, NodeConfig, NodeRole, NodeSpec, SignerAssociation,
    NetworkStore, StoreError, TopologyValidator,
};
use chainyard_client::JsonRpcClient;
use chainyard_docker::{
    subnet::{rebase_ip, resolve_subnet, SubnetError},
    ContainerRuntime, ContainerSpec, RuntimeError, LABEL_NETWORK, LABEL_ROLE, LABEL_RPC_PORT,
};
use chainyard_genesis::GenesisBuilder;
use chainyard_key_manager::{KeyManager, KeyManagerError, NodeIdentity};
use chainyard_types::{validation, ValidationFinding};
use std::{
    collections::BTreeMap,
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{info, warn};

/// Everything tunable about one swarm instance.
#[derive(Clone, Debug)]
pub struct SwarmOptions {
    /// Container image every node runs.
    pub image: String,
    /// Hunt for an alternate subnet when the requested one is claimed.
    pub auto_resolve_subnet: bool,
    /// Make `start` fail when the container network is gone instead of
    /// recreating it.
    pub fail_if_network_missing: bool,
    /// Pause between node launches so peer discovery finds a listening
    /// bootstrap instead of racing it.
    pub settle_delay: Duration,
    /// Per-node bound on liveness probes.
    pub probe_timeout: Duration,
    /// Per-node retries for the container launch itself.
    pub launch_attempts: usize,
    /// Balance granted to the block producer when no explicit allocation
    /// funds it.
    pub default_miner_balance: u128,
}

impl Default for SwarmOptions {
    fn default() -> Self {
        SwarmOptions {
            image: "chainyard/node:latest".to_string(),
            auto_resolve_subnet: true,
            fail_if_network_missing: false,
            settle_delay: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(4),
            launch_attempts: 3,
            default_miner_balance: 1_000_000_000_000_000_000_000, // 1000 units
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwarmState {
    Unprovisioned,
    Created,
    Running,
    Stopped,
    Destroyed,
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("topology rejected: {}", validation::report(.0))]
    InvalidTopology(Vec<ValidationFinding>),
    #[error("cannot {action} network {network} while it is {state:?}")]
    WrongState {
        network: String,
        state: SwarmState,
        action: &'static str,
    },
    #[error("container network {0} does not exist and recreation is disabled")]
    NetworkMissing(String),
    #[error("no signer node is available to produce the first blocks")]
    NoBlockProducer,
    #[error("node {node} failed to launch after {attempts} attempts: {last_error}")]
    LaunchFailed {
        node: String,
        attempts: usize,
        last_error: String,
    },
    #[error(transparent)]
    Subnet(#[from] SubnetError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Key(#[from] KeyManagerError),
}

/// Liveness probe result for one node. A dead node is data, never an
/// error: "some nodes are down" is a state this system reports on.
#[derive(Clone, Debug)]
pub struct NodeConnectivity {
    pub node: String,
    pub is_active: bool,
    pub block_height: Option<u64>,
    pub peer_count: Option<u64>,
    pub error: Option<String>,
}

/// The orchestration facade for one network.
///
/// Not internally synchronized: callers must not run `create`, `apply` or
/// lifecycle transitions concurrently for the same network name. One
/// operation in flight per network is the caller's contract.
pub struct ChainSwarm<R> {
    pub(crate) runtime: R,
    pub(crate) store: NetworkStore,
    pub(crate) spec: NetworkSpec,
    pub(crate) nodes: Vec<NodeSpec>,
    pub(crate) associations: Vec<SignerAssociation>,
    pub(crate) state: SwarmState,
    pub(crate) options: SwarmOptions,
}

impl<R: ContainerRuntime> ChainSwarm<R> {
    /// A swarm for a network that does not exist yet; call [`create`] next.
    ///
    /// [`create`]: ChainSwarm::create
    pub fn new(runtime: R, store: NetworkStore, spec: NetworkSpec, options: SwarmOptions) -> Self {
        ChainSwarm {
            runtime,
            store,
            spec,
            nodes: Vec::new(),
            associations: Vec::new(),
            state: SwarmState::Unprovisioned,
            options,
        }
    }

    /// Reattaches to a previously created network from its persisted
    /// descriptor.
    pub fn load(
        runtime: R,
        store: NetworkStore,
        network: &str,
        options: SwarmOptions,
    ) -> Result<Self, SwarmError> {
        let descriptor = store.load_descriptor(network)?;
        Ok(ChainSwarm {
            runtime,
            store,
            spec: descriptor.spec,
            nodes: descriptor.nodes,
            associations: descriptor.signer_associations,
            state: SwarmState::Created,
            options,
        })
    }

    pub fn state(&self) -> SwarmState {
        self.state
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn associations(&self) -> &[SignerAssociation] {
        &self.associations
    }

    pub fn store(&self) -> &NetworkStore {
        &self.store
    }

    pub(crate) fn key_manager(&self) -> KeyManager {
        KeyManager::new(self.store.network_root(&self.spec.name))
    }

    pub fn container_name(&self, node: &str) -> String {
        format!("{}-{}", self.spec.name, node)
    }

    /// RPC endpoint per node, in topology order.
    pub fn rpc_endpoints(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .map(|n| (n.name.clone(), format!("http://{}:{}", n.ip, n.rpc_port)))
            .collect()
    }

    /// Validates and provisions the network: runtime network (with subnet
    /// conflict resolution), node identities, genesis, and one rendered
    /// config per node.
    ///
    /// Any validation finding aborts before the first side effect.
    pub fn create(&mut self, nodes: Vec<NodeSpec>) -> Result<(), SwarmError> {
        if self.state != SwarmState::Unprovisioned {
            return Err(self.wrong_state("create"));
        }

        let tracked = self.store.list_tracked()?;
        let findings = TopologyValidator::validate(&self.spec, &nodes, &tracked);
        if !findings.is_empty() {
            return Err(SwarmError::InvalidTopology(findings));
        }

        // Subnet resolution must come before genesis: genesis encodes no
        // addresses, but every node config rendered below does.
        let mut nodes = nodes;
        let resolved = resolve_subnet(
            self.spec.subnet,
            &self.runtime,
            self.options.auto_resolve_subnet,
        )?;
        if resolved != self.spec.subnet {
            info!(
                network = %self.spec.name,
                from = %self.spec.subnet,
                to = %resolved,
                "rebasing node addresses into resolved subnet"
            );
            for node in nodes.iter_mut() {
                node.ip = rebase_ip(node.ip, &self.spec.subnet, &resolved);
            }
            self.spec.subnet = resolved;
        }

        let identities = self.materialize_identities(&nodes)?;

        let associations = associate_signers(&self.spec, &nodes);
        let producer = nodes
            .iter()
            .find(|n| n.role == NodeRole::Signer)
            .and_then(|n| associations.iter().find(|a| a.node_name == n.name))
            .map(|a| a.account)
            .ok_or(SwarmError::NoBlockProducer)?;

        let genesis = GenesisBuilder::build(
            &self.spec,
            &associations,
            producer,
            self.options.default_miner_balance,
        );
        self.store
            .write_genesis_once(&self.spec.name, &genesis.to_json())?;

        render_all_configs(&self.store, &self.spec, &nodes, &identities)?;

        self.store.save_descriptor(&NetworkDescriptor {
            spec: self.spec.clone(),
            nodes: nodes.clone(),
            signer_associations: associations.clone(),
        })?;

        self.nodes = nodes;
        self.associations = associations;
        self.state = SwarmState::Created;
        info!(network = %self.spec.name, nodes = self.nodes.len(), "network created");
        Ok(())
    }

    /// Launches every node in dependency order: bootstrap nodes first, then
    /// signers, then query/relay nodes, pausing between launches so peer
    /// discovery never races a bootstrap that is not listening yet.
    pub fn start(&mut self) -> Result<(), SwarmError> {
        match self.state {
            SwarmState::Created | SwarmState::Stopped => {}
            SwarmState::Running => return Ok(()),
            _ => return Err(self.wrong_state("start")),
        }

        if !self.runtime.network_exists(&self.spec.name)? {
            if self.options.fail_if_network_missing {
                return Err(SwarmError::NetworkMissing(self.spec.name.clone()));
            }
            self.runtime
                .create_network(&self.spec.name, &self.spec.subnet)?;
        }

        let mut ordered: Vec<&NodeSpec> = self.nodes.iter().collect();
        ordered.sort_by_key(|n| n.role.launch_rank());

        for (index, node) in ordered.iter().enumerate() {
            self.launch_node(node)?;
            if index + 1 < ordered.len() {
                thread::sleep(self.options.settle_delay);
            }
        }

        self.state = SwarmState::Running;
        info!(network = %self.spec.name, "all nodes launched");
        Ok(())
    }

    fn launch_node(&self, node: &NodeSpec) -> Result<(), SwarmError> {
        let container = self.container_spec(node);
        let mut last_error = String::new();
        for attempt in 1..=self.options.launch_attempts {
            // A leftover container from an earlier failed start would make
            // the name collide; clearing it first keeps retries safe.
            self.runtime.remove_container(&container.name)?;
            match self.runtime.run_container(&container) {
                Ok(id) => {
                    info!(node = %node.name, container = %id, "node launched");
                    return Ok(());
                }
                Err(e) => {
                    warn!(node = %node.name, attempt, error = %e, "launch attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(SwarmError::LaunchFailed {
            node: node.name.clone(),
            attempts: self.options.launch_attempts,
            last_error,
        })
    }

    fn container_spec(&self, node: &NodeSpec) -> ContainerSpec {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_NETWORK.to_string(), self.spec.name.clone());
        labels.insert(LABEL_ROLE.to_string(), node.role.to_string());
        labels.insert(LABEL_RPC_PORT.to_string(), node.rpc_port.to_string());
        ContainerSpec {
            name: self.container_name(&node.name),
            image: self.options.image.clone(),
            network: self.spec.name.clone(),
            ip: node.ip,
            labels,
            volumes: vec![
                (
                    self.store.node_dir(&self.spec.name, &node.name),
                    "/config".to_string(),
                ),
                (
                    self.store.genesis_path(&self.spec.name),
                    chainyard_config::node_config::CONTAINER_GENESIS_FILE.to_string(),
                ),
            ],
            published_ports: vec![],
            command: vec!["--config".to_string(), "/config/node.toml".to_string()],
        }
    }

    /// Stops all running containers. Configs, identities and genesis stay
    /// on disk; the network can be started again. Idempotent.
    pub fn stop(&mut self) -> Result<(), SwarmError> {
        match self.state {
            SwarmState::Unprovisioned => return Err(self.wrong_state("stop")),
            SwarmState::Destroyed => return Ok(()),
            _ => {}
        }
        for container in self.runtime.list_containers(&self.spec.name)? {
            let node = container
                .strip_prefix(&format!("{}-", self.spec.name))
                .unwrap_or(&container);
            let log_path = self
                .store
                .logs_dir(&self.spec.name)
                .join(format!("{}.log", node));
            if let Err(e) = self.runtime.capture_logs(&container, &log_path) {
                warn!(container = %container, error = %e, "log capture failed");
            }
            self.runtime.stop_container(&container)?;
        }
        self.state = SwarmState::Stopped;
        Ok(())
    }

    /// Removes containers, the runtime network and every persisted file.
    /// Genuinely irreversible, and safe to retry if interrupted.
    pub fn destroy(&mut self) -> Result<(), SwarmError> {
        for container in self.runtime.list_containers(&self.spec.name)? {
            self.runtime.stop_container(&container)?;
            self.runtime.remove_container(&container)?;
        }
        self.runtime.remove_network(&self.spec.name)?;
        self.store.remove_network(&self.spec.name)?;
        self.state = SwarmState::Destroyed;
        info!(network = %self.spec.name, "network destroyed");
        Ok(())
    }

    /// Probes every node concurrently, each probe individually bounded by
    /// the configured timeout. Always returns one entry per node.
    pub fn connectivity(&self) -> Vec<NodeConnectivity> {
        let handles: Vec<_> = self
            .nodes
            .iter()
            .map(|node| {
                let name = node.name.clone();
                let ip = node.ip;
                let rpc_port = node.rpc_port;
                let timeout = self.options.probe_timeout;
                thread::spawn(move || probe_node(name, ip, rpc_port, timeout))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("probe threads do not panic"))
            .collect()
    }

    /// Polls until the spread between the highest and lowest block height
    /// among active nodes is at most one block, or `max_wait` elapses.
    /// Returns `false` on timeout; never errors.
    pub fn wait_for_sync(&self, max_wait: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            if heights_synced(&self.connectivity()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(poll_interval);
        }
    }

    fn materialize_identities(
        &self,
        nodes: &[NodeSpec],
    ) -> Result<BTreeMap<String, NodeIdentity>, SwarmError> {
        let key_manager = self.key_manager();
        let mut identities = BTreeMap::new();
        for node in nodes {
            let identity = key_manager.identity_for(&node.name, node.ip, node.peer_port)?;
            identities.insert(node.name.clone(), identity);
        }
        Ok(identities)
    }

    fn wrong_state(&self, action: &'static str) -> SwarmError {
        SwarmError::WrongState {
            network: self.spec.name.clone(),
            state: self.state,
            action,
        }
    }
}

/// Pairs signer-role nodes with signer accounts, both in declaration
/// order. The validator has already enforced the counts line up for the
/// consensus in play.
pub(crate) fn associate_signers(spec: &NetworkSpec, nodes: &[NodeSpec]) -> Vec<SignerAssociation> {
    nodes
        .iter()
        .filter(|n| n.role == NodeRole::Signer)
        .zip(spec.signer_accounts.iter())
        .map(|(node, account)| SignerAssociation {
            node_name: node.name.clone(),
            account: account.address,
        })
        .collect()
}

/// Renders and persists the config of every node from the current
/// bootstrap set. Rendering is pure, so recomputing every config is always
/// safe.
pub(crate) fn render_all_configs(
    store: &NetworkStore,
    spec: &NetworkSpec,
    nodes: &[NodeSpec],
    identities: &BTreeMap<String, NodeIdentity>,
) -> Result<(), StoreError> {
    let bootstrap_uris: Vec<String> = nodes
        .iter()
        .filter(|n| n.role == NodeRole::Bootstrap)
        .filter_map(|n| identities.get(&n.name).map(|i| i.enode.clone()))
        .collect();
    for node in nodes {
        let identity = &identities[&node.name];
        let config = NodeConfig::render(node, spec, identity, &bootstrap_uris);
        store.save_node_config(&spec.name, &node.name, &config)?;
    }
    Ok(())
}

fn probe_node(name: String, ip: std::net::Ipv4Addr, rpc_port: u16, timeout: Duration) -> NodeConnectivity {
    let client = JsonRpcClient::from_endpoint(ip, rpc_port, timeout);
    match client.block_number().and_then(|height| {
        client.peer_count().map(|peers| (height, peers))
    }) {
        Ok((height, peers)) => NodeConnectivity {
            node: name,
            is_active: true,
            block_height: Some(height),
            peer_count: Some(peers),
            error: None,
        },
        Err(e) => NodeConnectivity {
            node: name,
            is_active: false,
            block_height: None,
            peer_count: None,
            error: Some(e.to_string()),
        },
    }
}

/// Active nodes are in sync when their reported heights differ by at most
/// one block. No active node means no sync.
pub(crate) fn heights_synced(statuses: &[NodeConnectivity]) -> bool {
    let heights: Vec<u64> = statuses
        .iter()
        .filter(|s| s.is_active)
        .filter_map(|s| s.block_height)
        .collect();
    match (heights.iter().min(), heights.iter().max()) {
        (Some(min), Some(max)) => max - min <= 1,
        _ => false,
    }
}
