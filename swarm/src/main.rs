// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use chainyard_config::{
    ConsensusKind, GenesisAccount, NetworkSpec, NetworkStore, NodeRole, NodeSpec,
};
use chainyard_docker::DockerCli;
use chainyard_faucet::{KeyFactory, Seed};
use chainyard_swarm::{ChainSwarm, SwarmOptions};
use chainyard_types::{ChainId, Ipv4Cidr};
use structopt::StructOpt;
use tracing::info;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "chainyard-swarm",
    about = "Spin up a private containerized blockchain network"
)]
struct Args {
    /// Network name; doubles as the container-network identifier.
    #[structopt(short = "n", long, default_value = "chainyard-dev")]
    name: String,
    /// Number of bootstrap (peer-discovery) nodes.
    #[structopt(short = "b", long, default_value = "1")]
    bootstrap_nodes: usize,
    /// Number of block-producing signer nodes.
    #[structopt(short = "s", long, default_value = "1")]
    signer_nodes: usize,
    /// Number of read-only query nodes.
    #[structopt(short = "q", long, default_value = "0")]
    query_nodes: usize,
    /// Number of relay validators (BFT consensus only).
    #[structopt(short = "r", long, default_value = "0")]
    relay_nodes: usize,
    /// One of: authority-round, byzantine-fault-tolerant-v1, byzantine-fault-tolerant-v2.
    #[structopt(long, default_value = "authority-round")]
    consensus: ConsensusKind,
    #[structopt(long, default_value = "9999")]
    chain_id: u64,
    #[structopt(long, default_value = "10.0.0.0/24")]
    subnet: Ipv4Cidr,
    #[structopt(long, default_value = "8000000")]
    gas_limit: u64,
    /// Seconds between blocks; defaults to the consensus default.
    #[structopt(long)]
    block_interval_secs: Option<u64>,
    /// Container image every node runs.
    #[structopt(long, default_value = "chainyard/node:latest")]
    image: String,
    /// Directory for configs, keys, genesis and logs, kept after exit.
    /// A self-deleting temporary directory is used when unspecified.
    #[structopt(short = "c", long)]
    storage_dir: Option<String>,
    /// Seed phrase the signer and prefund accounts are derived from.
    #[structopt(long, default_value = "chainyard dev chainyard dev chainyard")]
    seed_phrase: String,
    /// Extra prefunded accounts derived after the signer accounts.
    #[structopt(long, default_value = "0")]
    prefund_accounts: u64,
    /// Provision only; do not launch containers.
    #[structopt(long)]
    no_start: bool,
    /// Leave the network running (and its files in place) on exit.
    #[structopt(long)]
    keep: bool,
}

const SIGNER_BALANCE: u128 = 1_000_000_000_000_000_000_000; // 1000 units
const PREFUND_BALANCE: u128 = 1_000_000_000_000_000_000_000;

fn build_topology(args: &Args) -> (Vec<NodeSpec>, Vec<GenesisAccount>, Vec<GenesisAccount>) {
    let mut nodes = Vec::new();
    let mut next_host = 10u32;
    let mut push = |prefix: &str, count: usize, role: NodeRole, nodes: &mut Vec<NodeSpec>| {
        for i in 0..count {
            nodes.push(NodeSpec::new(
                format!("{}-{}", prefix, i),
                args.subnet.host_at(next_host),
                8545,
                role,
            ));
            next_host += 1;
        }
    };
    push("boot", args.bootstrap_nodes, NodeRole::Bootstrap, &mut nodes);
    push("signer", args.signer_nodes, NodeRole::Signer, &mut nodes);
    push("query", args.query_nodes, NodeRole::Query, &mut nodes);
    push("relay", args.relay_nodes, NodeRole::Relay, &mut nodes);

    let factory = KeyFactory::new(Seed::new(&args.seed_phrase));
    let derived =
        factory.derive_accounts(args.signer_nodes as u64 + args.prefund_accounts);
    let signer_accounts = derived[..args.signer_nodes]
        .iter()
        .map(|k| GenesisAccount {
            address: k.address,
            balance: SIGNER_BALANCE,
        })
        .collect();
    let prefunded_accounts = derived[args.signer_nodes..]
        .iter()
        .map(|k| GenesisAccount {
            address: k.address,
            balance: PREFUND_BALANCE,
        })
        .collect();
    (nodes, signer_accounts, prefunded_accounts)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::from_args();

    // Persistent storage dir if requested, otherwise a temp dir that
    // cleans itself up when the process exits.
    let _temp_dir;
    let storage_root = match &args.storage_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("creating storage dir")?;
            std::path::PathBuf::from(dir)
        }
        None => {
            let temp_dir = tempfile::tempdir().context("creating temporary storage dir")?;
            let root = temp_dir.path().to_path_buf();
            _temp_dir = temp_dir;
            root
        }
    };

    let (nodes, signer_accounts, prefunded_accounts) = build_topology(&args);
    let spec = NetworkSpec {
        name: args.name.clone(),
        chain_id: ChainId::new(args.chain_id),
        subnet: args.subnet,
        consensus: args.consensus,
        gas_limit: args.gas_limit,
        block_interval_secs: args.block_interval_secs,
        signer_accounts,
        prefunded_accounts,
    };

    let options = SwarmOptions {
        image: args.image.clone(),
        ..SwarmOptions::default()
    };
    let mut swarm = ChainSwarm::new(
        DockerCli::default(),
        NetworkStore::new(&storage_root),
        spec,
        options,
    );

    swarm.create(nodes).context("provisioning network")?;
    info!(network = %args.name, root = %storage_root.display(), "network provisioned");

    if args.no_start {
        println!("Network {} provisioned under {:?}; not started.", args.name, storage_root);
        return Ok(());
    }

    swarm.start().context("starting network")?;
    println!("Network {} is up. RPC endpoints:", args.name);
    for (node, endpoint) in swarm.rpc_endpoints() {
        println!("\t{}\t{}", node, endpoint);
    }

    // Hold the foreground until CTRL-C, then tear down.
    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        tx.send(()).expect("failed to send unit when handling CTRL-C");
    })
    .expect("failed to set CTRL-C handler");
    println!("CTRL-C to exit.");
    rx.recv()
        .expect("failed to receive unit when handling CTRL-C");

    if args.keep {
        swarm.stop().context("stopping network")?;
        println!(
            "Network {} stopped; files kept under {:?}.",
            args.name, storage_root
        );
    } else {
        swarm.destroy().context("destroying network")?;
        println!("Network {} destroyed.", args.name);
    }
    Ok(())
}
