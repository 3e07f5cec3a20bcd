// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subnet conflict detection and resolution.
//!
//! Runs strictly before genesis construction: genesis does not encode
//! addresses, but every rendered node config does, so a subnet move must
//! happen while node specs are still just data.

use crate::{ContainerRuntime, RuntimeError};
use chainyard_types::Ipv4Cidr;
use rand::Rng;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{info, warn};

/// Alternate private ranges tried in order when the requested subnet is
/// already claimed.
pub const ALTERNATE_SUBNETS: &[&str] = &[
    "10.10.0.0/16",
    "10.42.0.0/16",
    "172.20.0.0/16",
    "172.28.0.0/16",
    "192.168.128.0/20",
];

/// Random-perturbation attempts after the fixed list is exhausted.
const MAX_RANDOM_ATTEMPTS: usize = 32;

#[derive(Debug, Error)]
pub enum SubnetError {
    #[error(
        "subnet {0} is already claimed by another container network \
         and automatic resolution is disabled"
    )]
    Conflict(Ipv4Cidr),
    #[error("could not find a free subnet after trying {0} candidates")]
    Exhausted(usize),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Picks a free subnet for a new network.
///
/// Returns the requested subnet unchanged when it is free. On a conflict
/// with `auto_resolve` set, walks [`ALTERNATE_SUBNETS`] and then randomly
/// perturbed `10.x.0.0/16` ranges until one clears the probe.
pub fn resolve_subnet<R: ContainerRuntime>(
    requested: Ipv4Cidr,
    runtime: &R,
    auto_resolve: bool,
) -> Result<Ipv4Cidr, SubnetError> {
    let claimed = runtime.claimed_subnets()?;
    if is_free(&requested, &claimed) {
        return Ok(requested);
    }
    if !auto_resolve {
        return Err(SubnetError::Conflict(requested));
    }
    warn!(subnet = %requested, "requested subnet is claimed, searching for an alternate");

    let mut attempts = 0;
    for candidate in ALTERNATE_SUBNETS {
        let candidate: Ipv4Cidr = candidate.parse().expect("static subnet list parses");
        attempts += 1;
        if is_free(&candidate, &claimed) {
            info!(subnet = %candidate, "resolved subnet conflict with alternate range");
            return Ok(candidate);
        }
    }

    let mut rng = rand::thread_rng();
    for _ in 0..MAX_RANDOM_ATTEMPTS {
        let second_octet: u8 = rng.gen_range(1..=254);
        let candidate =
            Ipv4Cidr::new(Ipv4Addr::new(10, second_octet, 0, 0), 16).expect("valid /16");
        attempts += 1;
        if is_free(&candidate, &claimed) {
            info!(subnet = %candidate, "resolved subnet conflict with perturbed range");
            return Ok(candidate);
        }
    }

    Err(SubnetError::Exhausted(attempts))
}

fn is_free(candidate: &Ipv4Cidr, claimed: &[Ipv4Cidr]) -> bool {
    claimed.iter().all(|c| !c.overlaps(candidate))
}

/// Moves `ip` from `old` into `new`, preserving its host offset from the
/// network address (same last octets, new prefix).
pub fn rebase_ip(ip: Ipv4Addr, old: &Ipv4Cidr, new: &Ipv4Cidr) -> Ipv4Addr {
    new.host_at(old.host_offset(ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRuntime;

    #[test]
    fn free_subnet_is_returned_unchanged() {
        let runtime = FakeRuntime::new();
        let requested: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            resolve_subnet(requested, &runtime, true).unwrap(),
            requested
        );
    }

    #[test]
    fn conflict_without_auto_resolve_is_fatal() {
        let runtime = FakeRuntime::new();
        runtime.claim_subnet("10.0.0.0/16".parse().unwrap());
        let requested: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
        match resolve_subnet(requested, &runtime, false) {
            Err(SubnetError::Conflict(c)) => assert_eq!(c, requested),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn conflict_resolves_to_first_free_alternate() {
        let runtime = FakeRuntime::new();
        runtime.claim_subnet("10.0.0.0/16".parse().unwrap());
        // first alternate is taken too
        runtime.claim_subnet("10.10.0.0/16".parse().unwrap());
        let requested: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
        let resolved = resolve_subnet(requested, &runtime, true).unwrap();
        assert_eq!(resolved, "10.42.0.0/16".parse().unwrap());
    }

    #[test]
    fn rebase_preserves_host_offsets() {
        let old: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
        let new: Ipv4Cidr = "172.20.0.0/16".parse().unwrap();
        assert_eq!(
            rebase_ip("10.0.0.42".parse().unwrap(), &old, &new),
            "172.20.0.42".parse::<Ipv4Addr>().unwrap()
        );
        assert_eq!(
            rebase_ip("10.0.0.10".parse().unwrap(), &old, &new),
            "172.20.0.10".parse::<Ipv4Addr>().unwrap()
        );
    }
}
