// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use chainyard_config::{
    ConsensusKind, GenesisAccount, NetworkSpec, NetworkStore, NodeRole, NodeSpec,
};
use chainyard_docker::fake::FakeRuntime;
use chainyard_genesis::GenesisDocument;
use chainyard_key_manager::NodeIdentity;
use chainyard_swarm::{
    ChainSwarm, NodeUpdate, SwarmError, SwarmOptions, SwarmState, TopologyUpdater, UpdateError,
    UpdateOptions, UpdatePlan,
};
use chainyard_types::{AccountAddress, ChainId};
use std::{net::Ipv4Addr, time::Duration};

const SIGNER_ACCOUNT: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn test_options() -> SwarmOptions {
    SwarmOptions {
        settle_delay: Duration::from_millis(0),
        launch_attempts: 1,
        probe_timeout: Duration::from_millis(100),
        ..SwarmOptions::default()
    }
}

/// Network from the reference scenario: subnet 10.0.0.0/24, one bootstrap
/// at .10, one signer at .11, chain id 9999, authority-round, one signer
/// account holding one whole unit.
fn scenario_spec() -> (NetworkSpec, Vec<NodeSpec>) {
    let spec = NetworkSpec {
        name: "testnet".to_string(),
        chain_id: ChainId::new(9999),
        subnet: "10.0.0.0/24".parse().unwrap(),
        consensus: ConsensusKind::AuthorityRound,
        gas_limit: 8_000_000,
        block_interval_secs: None,
        signer_accounts: vec![GenesisAccount {
            address: SIGNER_ACCOUNT.parse().unwrap(),
            balance: 1_000_000_000_000_000_000,
        }],
        prefunded_accounts: vec![],
    };
    let nodes = vec![
        NodeSpec::new("boot-0", ip(10), 8545, NodeRole::Bootstrap),
        NodeSpec::new("signer-0", ip(11), 8545, NodeRole::Signer),
    ];
    (spec, nodes)
}

fn build_swarm() -> (ChainSwarm<FakeRuntime>, FakeRuntime, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    let (spec, _) = scenario_spec();
    let swarm = ChainSwarm::new(
        runtime.clone(),
        NetworkStore::new(dir.path()),
        spec,
        test_options(),
    );
    (swarm, runtime, dir)
}

fn created_swarm() -> (ChainSwarm<FakeRuntime>, FakeRuntime, tempfile::TempDir) {
    let (mut swarm, runtime, dir) = build_swarm();
    let (_, nodes) = scenario_spec();
    swarm.create(nodes).unwrap();
    (swarm, runtime, dir)
}

#[test]
fn create_provisions_genesis_and_one_config_per_node() {
    let (swarm, _runtime, _dir) = created_swarm();
    assert_eq!(swarm.state(), SwarmState::Created);

    let store = swarm.store();
    let genesis = GenesisDocument::from_json(&store.read_genesis("testnet").unwrap()).unwrap();
    assert_eq!(genesis.chain_id, 9999);
    // exactly the one signer allocation from the spec
    assert_eq!(genesis.alloc.len(), 1);
    let signer: AccountAddress = SIGNER_ACCOUNT.parse().unwrap();
    assert_eq!(genesis.alloc[&signer].balance, "1000000000000000000");
    // extra-data carries exactly one signer between vanity and seal
    let raw = hex::decode(genesis.extra_data.trim_start_matches("0x")).unwrap();
    assert_eq!(raw.len(), 32 + 20 + 65);

    for node in &["boot-0", "signer-0"] {
        assert!(store.node_config_path("testnet", node).exists());
    }
    let descriptor = store.load_descriptor("testnet").unwrap();
    assert_eq!(descriptor.nodes.len(), 2);
    assert_eq!(descriptor.signer_associations.len(), 1);
    assert_eq!(descriptor.signer_associations[0].node_name, "signer-0");
}

#[test]
fn load_reattaches_from_the_persisted_descriptor() {
    let (swarm, runtime, dir) = created_swarm();
    drop(swarm);

    let reloaded = ChainSwarm::load(
        runtime,
        NetworkStore::new(dir.path()),
        "testnet",
        test_options(),
    )
    .unwrap();
    assert_eq!(reloaded.state(), SwarmState::Created);
    assert_eq!(reloaded.nodes().len(), 2);
    assert_eq!(reloaded.spec().chain_id, ChainId::new(9999));
    assert_eq!(reloaded.associations().len(), 1);

    // loading an unknown network is an error, not an empty swarm
    let dir2 = tempfile::tempdir().unwrap();
    assert!(ChainSwarm::load(
        FakeRuntime::new(),
        NetworkStore::new(dir2.path()),
        "missing",
        test_options(),
    )
    .is_err());
}

#[test]
fn invalid_topology_causes_no_side_effects() {
    let (mut swarm, runtime, dir) = build_swarm();
    // two signers, one signer account: bijection violation
    let (_, mut nodes) = scenario_spec();
    nodes.push(NodeSpec::new("signer-1", ip(12), 8545, NodeRole::Signer));

    match swarm.create(nodes) {
        Err(SwarmError::InvalidTopology(findings)) => assert!(!findings.is_empty()),
        other => panic!("expected InvalidTopology, got {:?}", other.map(|_| ())),
    }
    assert_eq!(swarm.state(), SwarmState::Unprovisioned);
    assert!(runtime.events().is_empty());
    // nothing persisted at all
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn duplicate_chain_id_across_tracked_networks_is_rejected() {
    let (_, nodes) = scenario_spec();
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    let store = NetworkStore::new(dir.path());

    let (spec, _) = scenario_spec();
    let mut first = ChainSwarm::new(runtime.clone(), store.clone(), spec, test_options());
    first.create(nodes.clone()).unwrap();

    // second network reuses the chain id and subnet
    let (mut spec, _) = scenario_spec();
    spec.name = "othernet".to_string();
    let mut second = ChainSwarm::new(runtime, store, spec, test_options());
    match second.create(nodes) {
        Err(SwarmError::InvalidTopology(findings)) => {
            assert!(findings.iter().any(|f| f.field == "network.chainId"));
            assert!(findings.iter().any(|f| f.field == "network.subnet"));
        }
        other => panic!("expected InvalidTopology, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn start_launches_in_dependency_order() {
    let (mut swarm, runtime, _dir) = created_swarm();
    swarm.start().unwrap();
    assert_eq!(swarm.state(), SwarmState::Running);

    let launches: Vec<String> = runtime
        .events()
        .into_iter()
        .filter(|e| e.starts_with("run:"))
        .collect();
    // bootstrap strictly before the signer
    assert_eq!(launches, vec!["run:testnet-boot-0", "run:testnet-signer-0"]);
    assert!(runtime.network("testnet").is_some());
    assert_eq!(runtime.running_containers().len(), 2);

    // containers carry the discovery labels
    let container = runtime.container("testnet-boot-0").unwrap();
    assert_eq!(
        container.spec.labels.get("chainyard.network").map(String::as_str),
        Some("testnet")
    );
    assert_eq!(
        container.spec.labels.get("chainyard.role").map(String::as_str),
        Some("bootstrap")
    );
}

#[test]
fn start_recreates_or_requires_the_network_per_options() {
    let (mut swarm, runtime, _dir) = created_swarm();
    // network does not exist yet: default behavior creates it
    swarm.start().unwrap();
    assert!(runtime.network("testnet").is_some());

    // wipe it and require existence: start must fail
    let (mut swarm, runtime, _dir) = {
        let dir = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::new();
        let (spec, nodes) = scenario_spec();
        let mut swarm = ChainSwarm::new(
            runtime.clone(),
            NetworkStore::new(dir.path()),
            spec,
            SwarmOptions {
                fail_if_network_missing: true,
                ..test_options()
            },
        );
        swarm.create(nodes).unwrap();
        (swarm, runtime, dir)
    };
    match swarm.start() {
        Err(SwarmError::NetworkMissing(name)) => assert_eq!(name, "testnet"),
        other => panic!("expected NetworkMissing, got {:?}", other.map(|_| ())),
    }
    assert!(runtime.network("testnet").is_none());
}

#[test]
fn stop_and_destroy_are_idempotent() {
    let (mut swarm, runtime, dir) = created_swarm();
    swarm.start().unwrap();

    swarm.stop().unwrap();
    assert_eq!(swarm.state(), SwarmState::Stopped);
    assert!(runtime.running_containers().is_empty());
    // configs and keys survive a stop
    assert!(swarm.store().node_config_path("testnet", "boot-0").exists());
    swarm.stop().unwrap();
    assert_eq!(swarm.state(), SwarmState::Stopped);

    swarm.destroy().unwrap();
    assert_eq!(swarm.state(), SwarmState::Destroyed);
    assert!(runtime.network("testnet").is_none());
    assert!(runtime.container("testnet-boot-0").is_none());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    // destroying again is a no-op, not an error
    swarm.destroy().unwrap();
}

#[test]
fn stopped_networks_restart() {
    let (mut swarm, runtime, _dir) = created_swarm();
    swarm.start().unwrap();
    swarm.stop().unwrap();
    swarm.start().unwrap();
    assert_eq!(swarm.state(), SwarmState::Running);
    assert_eq!(runtime.running_containers().len(), 2);
}

#[test]
fn subnet_conflict_rebases_node_addresses_before_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    // the requested 10.0.0.0/24 is swallowed by a foreign /16
    runtime.claim_subnet("10.0.0.0/16".parse().unwrap());

    let (spec, nodes) = scenario_spec();
    let mut swarm = ChainSwarm::new(
        runtime,
        NetworkStore::new(dir.path()),
        spec,
        test_options(),
    );
    swarm.create(nodes).unwrap();

    // first free alternate, same host offsets
    assert_eq!(swarm.spec().subnet, "10.10.0.0/16".parse().unwrap());
    assert_eq!(swarm.nodes()[0].ip, "10.10.0.10".parse::<Ipv4Addr>().unwrap());
    assert_eq!(swarm.nodes()[1].ip, "10.10.0.11".parse::<Ipv4Addr>().unwrap());

    // rendered configs and descriptor agree with the move
    let config = swarm.store().load_node_config("testnet", "signer-0").unwrap();
    assert_eq!(config.rpc.address, "10.10.0.11:8545");
    let descriptor = swarm.store().load_descriptor("testnet").unwrap();
    assert_eq!(descriptor.spec.subnet, "10.10.0.0/16".parse().unwrap());
}

#[test]
fn subnet_conflict_without_auto_resolution_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new();
    runtime.claim_subnet("10.0.0.0/16".parse().unwrap());

    let (spec, nodes) = scenario_spec();
    let mut swarm = ChainSwarm::new(
        runtime,
        NetworkStore::new(dir.path()),
        spec,
        SwarmOptions {
            auto_resolve_subnet: false,
            ..test_options()
        },
    );
    assert!(matches!(
        swarm.create(nodes),
        Err(SwarmError::Subnet(_))
    ));
}

#[test]
fn non_bootstrap_configs_reference_every_bootstrap() {
    let (swarm, _runtime, _dir) = created_swarm();
    let store = swarm.store();

    let boot_identity: NodeIdentity = serde_json::from_str(
        &std::fs::read_to_string(store.node_dir("testnet", "boot-0").join("identity.json"))
            .unwrap(),
    )
    .unwrap();
    let signer_config = store.load_node_config("testnet", "signer-0").unwrap();
    assert_eq!(signer_config.network.bootnodes, vec![boot_identity.enode]);

    // the signer mines to its own identity address
    let signer_identity: NodeIdentity = serde_json::from_str(
        &std::fs::read_to_string(store.node_dir("testnet", "signer-0").join("identity.json"))
            .unwrap(),
    )
    .unwrap();
    let mining = signer_config.mining.unwrap();
    assert!(mining.enabled);
    assert_eq!(mining.coinbase, signer_identity.address);
}

// ---- topology updates ----

#[test]
fn adding_a_query_node_extends_the_topology() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let plan = UpdatePlan {
        add: vec![NodeSpec::new("query-0", ip(12), 8545, NodeRole::Query)],
        ..Default::default()
    };
    let result = TopologyUpdater::new(&mut swarm)
        .apply(&plan, UpdateOptions::default())
        .unwrap();
    assert_eq!(result.nodes_added, 1);
    assert!(result.success);

    let descriptor = swarm.store().load_descriptor("testnet").unwrap();
    assert_eq!(descriptor.nodes.len(), 3);
    let config = swarm.store().load_node_config("testnet", "query-0").unwrap();
    assert_eq!(config.network.bootnodes.len(), 1);
}

#[test]
fn adding_a_signer_without_an_account_writes_nothing() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let descriptor_before = swarm.store().load_descriptor("testnet").unwrap();

    let plan = UpdatePlan {
        add: vec![NodeSpec::new("signer-1", ip(12), 8545, NodeRole::Signer)],
        ..Default::default()
    };
    match TopologyUpdater::new(&mut swarm).apply(&plan, UpdateOptions::default()) {
        Err(UpdateError::InvalidTopology(findings)) => {
            assert!(findings.iter().any(|f| f.field == "network.signerAccounts"));
        }
        other => panic!("expected InvalidTopology, got {:?}", other),
    }

    // no file was touched
    assert!(!swarm.store().node_config_path("testnet", "signer-1").exists());
    assert_eq!(
        swarm.store().load_descriptor("testnet").unwrap(),
        descriptor_before
    );
}

#[test]
fn removing_the_last_signer_is_rejected() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let plan = UpdatePlan {
        remove: vec!["signer-0".to_string()],
        ..Default::default()
    };
    match TopologyUpdater::new(&mut swarm).apply(&plan, UpdateOptions::default()) {
        Err(UpdateError::InvalidTopology(findings)) => assert!(!findings.is_empty()),
        other => panic!("expected InvalidTopology, got {:?}", other),
    }
    // the node's files survive the rejected removal
    assert!(swarm.store().node_config_path("testnet", "signer-0").exists());
}

#[test]
fn removing_an_unknown_node_is_a_distinct_error() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let plan = UpdatePlan {
        remove: vec!["ghost".to_string()],
        ..Default::default()
    };
    match TopologyUpdater::new(&mut swarm).apply(&plan, UpdateOptions::default()) {
        Err(UpdateError::UnknownNode(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected UnknownNode, got {:?}", other),
    }
}

#[test]
fn genesis_immutable_changes_are_rejected_distinctly() {
    let (mut swarm, _runtime, _dir) = created_swarm();

    let plan = UpdatePlan {
        consensus: Some(ConsensusKind::BftV2),
        ..Default::default()
    };
    assert!(matches!(
        TopologyUpdater::new(&mut swarm).apply(&plan, UpdateOptions::default()),
        Err(UpdateError::GenesisImmutable("consensus kind"))
    ));

    let plan = UpdatePlan {
        signer_accounts: Some(vec![]),
        ..Default::default()
    };
    assert!(matches!(
        TopologyUpdater::new(&mut swarm).apply(&plan, UpdateOptions::default()),
        Err(UpdateError::GenesisImmutable("signer account set"))
    ));

    // genesis on disk is untouched either way
    let genesis =
        GenesisDocument::from_json(&swarm.store().read_genesis("testnet").unwrap()).unwrap();
    assert_eq!(genesis.consensus, ConsensusKind::AuthorityRound);
}

#[test]
fn moving_a_bootstrap_rewrites_cached_references_and_keeps_its_key() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let identity_path = swarm
        .store()
        .node_dir("testnet", "boot-0")
        .join("identity.json");
    let before: NodeIdentity =
        serde_json::from_str(&std::fs::read_to_string(&identity_path).unwrap()).unwrap();

    let plan = UpdatePlan {
        update: vec![NodeUpdate::for_node("boot-0").ip(ip(99))],
        ..Default::default()
    };
    let result = TopologyUpdater::new(&mut swarm)
        .apply(&plan, UpdateOptions::default())
        .unwrap();
    assert_eq!(result.nodes_updated, 1);

    // the bootstrap's own identity moved with it, key unchanged
    let after: NodeIdentity =
        serde_json::from_str(&std::fs::read_to_string(&identity_path).unwrap()).unwrap();
    assert_eq!(before.private_key, after.private_key);
    assert_eq!(before.address, after.address);
    assert!(after.enode.ends_with("@10.0.0.99:30303"));

    // the signer's peer-discovery list now points at the new address
    let signer_config = swarm.store().load_node_config("testnet", "signer-0").unwrap();
    assert_eq!(signer_config.network.bootnodes, vec![after.enode.clone()]);

    // and its own rendered config reflects the move too
    let boot_config = swarm.store().load_node_config("testnet", "boot-0").unwrap();
    assert_eq!(boot_config.rpc.address, "10.0.0.99:8545");
}

#[test]
fn signer_associations_survive_unrelated_updates() {
    let (mut swarm, _runtime, _dir) = created_swarm();
    let before = swarm.associations().to_vec();

    let plan = UpdatePlan {
        add: vec![NodeSpec::new("query-0", ip(12), 8545, NodeRole::Query)],
        ..Default::default()
    };
    TopologyUpdater::new(&mut swarm)
        .apply(&plan, UpdateOptions::default())
        .unwrap();
    assert_eq!(swarm.associations(), &before[..]);
}

#[test]
fn start_after_update_launches_the_new_node() {
    let (mut swarm, runtime, _dir) = created_swarm();
    swarm.start().unwrap();

    let plan = UpdatePlan {
        add: vec![NodeSpec::new("query-0", ip(12), 8545, NodeRole::Query)],
        ..Default::default()
    };
    // a running swarm is restarted into the updated topology
    swarm.stop().unwrap();
    TopologyUpdater::new(&mut swarm)
        .apply(
            &plan,
            UpdateOptions {
                start_after_update: true,
            },
        )
        .unwrap();
    assert_eq!(swarm.state(), SwarmState::Running);
    assert!(runtime.container("testnet-query-0").is_some());
}

#[test]
fn connectivity_reports_unreachable_nodes_as_data() {
    let (swarm, _runtime, _dir) = created_swarm();
    // nothing is listening on these endpoints; probes must come back as
    // inactive entries, never as an error or a panic
    let statuses = swarm.connectivity();
    assert_eq!(statuses.len(), 2);
    for status in &statuses {
        assert!(!status.is_active);
        assert!(status.error.is_some());
        assert!(status.block_height.is_none());
    }
}

#[test]
fn wait_for_sync_times_out_quietly() {
    let (swarm, _runtime, _dir) = created_swarm();
    let synced = swarm.wait_for_sync(Duration::from_millis(200), Duration::from_millis(50));
    assert!(!synced);
}
