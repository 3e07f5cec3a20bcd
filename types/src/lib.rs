// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Core types shared by every chainyard crate: account addresses, chain
//! identifiers, IPv4 subnets, and the validation-finding model used by the
//! topology validator.

pub mod account_address;
pub mod chain_id;
pub mod cidr;
pub mod validation;

pub use account_address::AccountAddress;
pub use chain_id::ChainId;
pub use cidr::Ipv4Cidr;
pub use validation::{FindingCategory, ValidationFinding};

#[cfg(test)]
mod unit_tests;
