// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Blocking JSON-RPC client for the node processes chainyard launches.
//!
//! The orchestrator only ever issues read queries (block height, peer
//! count, balances) and transaction submission for funding; it never speaks
//! the consensus protocol itself. Every request carries the client's
//! timeout so a dead node costs a bounded wait, not a hang.

use chainyard_types::AccountAddress;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{net::Ipv4Addr, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("node returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Protocol(String),
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct JsonRpcClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("blocking client builder only fails on TLS misconfiguration");
        JsonRpcClient {
            url: url.into(),
            client,
        }
    }

    pub fn from_endpoint(ip: Ipv4Addr, rpc_port: u16, timeout: Duration) -> Self {
        Self::new(format!("http://{}:{}", ip, rpc_port), timeout)
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .and_then(|r| r.json())
            .map_err(|source| ClientError::Transport {
                url: self.url.clone(),
                source,
            })?;
        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ClientError::Protocol("response carries neither result nor error".into()))
    }

    fn call_quantity(&self, method: &str, params: Value) -> Result<u128, ClientError> {
        let result = self.call(method, params)?;
        let quantity = result
            .as_str()
            .ok_or_else(|| ClientError::Protocol(format!("{} did not return a quantity", method)))?;
        parse_quantity(quantity)
            .map_err(|_| ClientError::Protocol(format!("unparseable quantity {:?}", quantity)))
    }

    /// Height of the node's best block.
    pub fn block_number(&self) -> Result<u64, ClientError> {
        self.call_quantity("eth_blockNumber", json!([]))
            .map(|q| q as u64)
    }

    /// Number of peers the node is currently connected to.
    pub fn peer_count(&self) -> Result<u64, ClientError> {
        self.call_quantity("net_peerCount", json!([]))
            .map(|q| q as u64)
    }

    /// Latest balance of `address` in the chain's smallest unit.
    pub fn get_balance(&self, address: AccountAddress) -> Result<u128, ClientError> {
        self.call_quantity("eth_getBalance", json!([address.to_string(), "latest"]))
    }

    /// Submits a value transfer from an account the node holds unlocked.
    /// Returns the transaction hash.
    pub fn send_transaction(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        value: u128,
    ) -> Result<String, ClientError> {
        let result = self.call(
            "eth_sendTransaction",
            json!([{
                "from": from.to_string(),
                "to": to.to_string(),
                "value": to_quantity(value),
            }]),
        )?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Protocol("eth_sendTransaction did not return a hash".into()))
    }
}

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(quantity: &str) -> Result<u128, std::num::ParseIntError> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .unwrap_or(quantity);
    u128::from_str_radix(digits, 16)
}

/// Encodes a quantity the way nodes expect: `0x` + minimal hex digits.
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}
