// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`ContainerRuntime`] for orchestrator and updater tests.
//!
//! Records every lifecycle call in order so tests can assert on launch
//! sequencing, and mimics the idempotence contract of the real backend.

use crate::{ContainerRuntime, ContainerSpec, RuntimeError};
use chainyard_types::Ipv4Cidr;
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex},
};

#[derive(Clone, Debug)]
pub struct FakeContainer {
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Default)]
struct Inner {
    networks: BTreeMap<String, Ipv4Cidr>,
    containers: BTreeMap<String, FakeContainer>,
    /// Subnets claimed outside chainyard, for conflict tests.
    foreign_subnets: Vec<Ipv4Cidr>,
    events: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a subnet as claimed by some unrelated network on the host.
    pub fn claim_subnet(&self, subnet: Ipv4Cidr) {
        self.inner.lock().unwrap().foreign_subnets.push(subnet);
    }

    /// Every lifecycle call so far, in order, as `op:target` strings.
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn network(&self, name: &str) -> Option<Ipv4Cidr> {
        self.inner.lock().unwrap().networks.get(name).copied()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.inner.lock().unwrap().containers.get(name).cloned()
    }

    pub fn running_containers(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn record(&self, event: String) {
        self.inner.lock().unwrap().events.push(event);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create_network(&self, name: &str, subnet: &Ipv4Cidr) -> Result<(), RuntimeError> {
        self.record(format!("create-network:{}", name));
        let mut inner = self.inner.lock().unwrap();
        if inner.networks.contains_key(name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("network create {}", name),
                stderr: format!("network with name {} already exists", name),
            });
        }
        inner.networks.insert(name.to_string(), *subnet);
        Ok(())
    }

    fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.inner.lock().unwrap().networks.contains_key(name))
    }

    fn claimed_subnets(&self) -> Result<Vec<Ipv4Cidr>, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .networks
            .values()
            .copied()
            .chain(inner.foreign_subnets.iter().copied())
            .collect())
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove-network:{}", name));
        self.inner.lock().unwrap().networks.remove(name);
        Ok(())
    }

    fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.record(format!("run:{}", spec.name));
        let mut inner = self.inner.lock().unwrap();
        if !inner.networks.contains_key(&spec.network) {
            return Err(RuntimeError::CommandFailed {
                command: format!("run {}", spec.name),
                stderr: format!("network {} not found", spec.network),
            });
        }
        inner.containers.insert(
            spec.name.clone(),
            FakeContainer {
                spec: spec.clone(),
                running: true,
            },
        );
        Ok(format!("fake-{}", spec.name))
    }

    fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop:{}", name));
        if let Some(container) = self.inner.lock().unwrap().containers.get_mut(name) {
            container.running = false;
        }
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove:{}", name));
        self.inner.lock().unwrap().containers.remove(name);
        Ok(())
    }

    fn list_containers(&self, network: &str) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|(_, c)| c.spec.network == network)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn capture_logs(&self, _name: &str, _path: &Path) -> Result<(), RuntimeError> {
        Ok(())
    }
}
