// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{ContainerRuntime, ContainerSpec, RuntimeError};
use chainyard_types::Ipv4Cidr;
use std::{fs, path::Path, path::PathBuf, process::Command};
use tracing::debug;

/// [`ContainerRuntime`] backed by the `docker` command-line client.
pub struct DockerCli {
    docker_bin: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        DockerCli {
            docker_bin: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    pub fn new(docker_bin: impl Into<PathBuf>) -> Self {
        DockerCli {
            docker_bin: docker_bin.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let command = format!("docker {}", args.join(" "));
        debug!(%command, "invoking container runtime");
        let output = Command::new(&self.docker_bin)
            .args(args)
            .output()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Cleanup commands treat a missing target as success so retries from
    /// partially-cleaned states stay safe.
    fn run_idempotent(&self, args: &[&str]) -> Result<(), RuntimeError> {
        match self.run(args) {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandFailed { ref stderr, .. })
                if stderr.contains("No such") || stderr.contains("not found") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn create_network(&self, name: &str, subnet: &Ipv4Cidr) -> Result<(), RuntimeError> {
        let subnet = subnet.to_string();
        let label = format!("{}={}", crate::LABEL_NETWORK, name);
        self.run(&[
            "network", "create", "--driver", "bridge", "--subnet", &subnet, "--label", &label,
            name,
        ])
        .map(|_| ())
    }

    fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.run(&["network", "inspect", "--format", "{{.Name}}", name]) {
            Ok(_) => Ok(true),
            Err(RuntimeError::CommandFailed { ref stderr, .. })
                if stderr.contains("No such") || stderr.contains("not found") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn claimed_subnets(&self) -> Result<Vec<Ipv4Cidr>, RuntimeError> {
        let names = self.run(&["network", "ls", "--format", "{{.Name}}"])?;
        let mut subnets = Vec::new();
        for name in names.lines().filter(|l| !l.is_empty()) {
            let pools = self.run(&[
                "network",
                "inspect",
                "--format",
                "{{range .IPAM.Config}}{{.Subnet}} {{end}}",
                name,
            ])?;
            for token in pools.split_whitespace() {
                // Non-IPv4 pools (and the empty default) are irrelevant here.
                if let Ok(cidr) = token.parse::<Ipv4Cidr>() {
                    subnets.push(cidr);
                }
            }
        }
        Ok(subnets)
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_idempotent(&["network", "rm", name])
    }

    fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let ip = spec.ip.to_string();
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            spec.name.clone(),
            "--network".into(),
            spec.network.clone(),
            "--ip".into(),
            ip,
        ];
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{}={}", key, value));
        }
        for (host, container) in &spec.volumes {
            args.push("-v".into());
            args.push(format!("{}:{}", host.display(), container));
        }
        for port in &spec.published_ports {
            args.push("-p".into());
            args.push(format!("{}:{}", port, port));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&borrowed)
    }

    fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_idempotent(&["stop", name])
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_idempotent(&["rm", "-f", name])
    }

    fn list_containers(&self, network: &str) -> Result<Vec<String>, RuntimeError> {
        let filter = format!("label={}={}", crate::LABEL_NETWORK, network);
        let names = self.run(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])?;
        Ok(names
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn capture_logs(&self, name: &str, path: &Path) -> Result<(), RuntimeError> {
        let logs = self.run(&["logs", name])?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| RuntimeError::Spawn {
                command: format!("write logs for {}", name),
                source,
            })?;
        }
        fs::write(path, logs).map_err(|source| RuntimeError::Spawn {
            command: format!("write logs for {}", name),
            source,
        })
    }
}
