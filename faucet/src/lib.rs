// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Funding of derived dev accounts from a single source account.
//!
//! Funding is idempotent by design: accounts already holding more than a
//! dust threshold are skipped, so re-running a partially-applied batch
//! completes it instead of double-crediting. An insufficient-funds error
//! from the source halts the whole batch immediately; transient per-account
//! failures are logged and skipped so a retry can pick them up.

pub mod key_factory;

pub use key_factory::{ChildKey, ChildNumber, KeyFactory, Seed, DERIVATION_PATH};

use chainyard_client::{ClientError, JsonRpcClient};
use chainyard_types::AccountAddress;
use thiserror::Error;
use tracing::{info, warn};

/// The two ledger operations funding needs; [`JsonRpcClient`] is the real
/// implementation, tests use an in-memory one.
pub trait Ledger {
    fn balance_of(&self, address: AccountAddress) -> Result<u128, ClientError>;
    fn transfer(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        value: u128,
    ) -> Result<String, ClientError>;
}

impl Ledger for JsonRpcClient {
    fn balance_of(&self, address: AccountAddress) -> Result<u128, ClientError> {
        self.get_balance(address)
    }

    fn transfer(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        value: u128,
    ) -> Result<String, ClientError> {
        self.send_transaction(from, to, value)
    }
}

#[derive(Debug, Error)]
pub enum FaucetError {
    #[error(
        "source holds {available} but funding {pending} accounts needs {required} \
         including gas"
    )]
    InsufficientSource {
        available: u128,
        required: u128,
        pending: usize,
    },
    #[error("source ran out of funds while funding {address}: {message}")]
    SourceExhausted {
        address: AccountAddress,
        message: String,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone, Debug)]
pub struct FundingConfig {
    /// Amount credited to each account that needs funding.
    pub amount: u128,
    /// Accounts above this balance are considered funded and skipped.
    pub dust_threshold: u128,
    /// Conservative per-transfer gas cost added to the required total.
    pub gas_cost_estimate: u128,
}

impl Default for FundingConfig {
    fn default() -> Self {
        FundingConfig {
            amount: 1_000_000_000_000_000_000, // one whole unit
            dust_threshold: 1_000_000_000_000_000, // a thousandth
            gas_cost_estimate: 21_000 * 1_000_000_000, // transfer at 1 gwei
        }
    }
}

#[derive(Debug, Default)]
pub struct FundingOutcome {
    pub funded: Vec<AccountAddress>,
    pub skipped: Vec<AccountAddress>,
    /// Per-account transient failures; re-running the batch retries these.
    pub failed: Vec<(AccountAddress, String)>,
}

pub struct Faucet<'a, L: Ledger> {
    ledger: &'a L,
    source: AccountAddress,
    config: FundingConfig,
}

impl<'a, L: Ledger> Faucet<'a, L> {
    pub fn new(ledger: &'a L, source: AccountAddress, config: FundingConfig) -> Self {
        Faucet {
            ledger,
            source,
            config,
        }
    }

    /// Funds every target below the dust threshold.
    ///
    /// The source balance is checked against the full cost of the batch
    /// before the first transfer goes out.
    pub fn fund(&self, targets: &[AccountAddress]) -> Result<FundingOutcome, FaucetError> {
        let mut outcome = FundingOutcome::default();
        let mut to_fund = Vec::new();

        for target in targets {
            if self.ledger.balance_of(*target)? > self.config.dust_threshold {
                info!(account = %target, "already funded, skipping");
                outcome.skipped.push(*target);
            } else {
                to_fund.push(*target);
            }
        }
        if to_fund.is_empty() {
            return Ok(outcome);
        }

        let available = self.ledger.balance_of(self.source)?;
        let required = (self.config.amount + self.config.gas_cost_estimate)
            .saturating_mul(to_fund.len() as u128);
        if available < required {
            return Err(FaucetError::InsufficientSource {
                available,
                required,
                pending: to_fund.len(),
            });
        }

        for target in to_fund {
            match self.ledger.transfer(self.source, target, self.config.amount) {
                Ok(tx_hash) => {
                    info!(account = %target, tx = %tx_hash, "funded");
                    outcome.funded.push(target);
                }
                Err(e) if is_insufficient_funds(&e) => {
                    // The pre-check was defeated (concurrent spender, gas
                    // spike); nothing later in the batch can succeed.
                    return Err(FaucetError::SourceExhausted {
                        address: target,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(account = %target, error = %e, "transfer failed, continuing batch");
                    outcome.failed.push((target, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}

fn is_insufficient_funds(error: &ClientError) -> bool {
    match error {
        ClientError::Rpc { message, .. } => {
            message.to_ascii_lowercase().contains("insufficient funds")
        }
        _ => false,
    }
}
