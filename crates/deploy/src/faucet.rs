//! Funding accounts on simulation networks.
//!
//! Tenderly forks expose `tenderly_setBalance`, which overwrites an account's native balance
//! without a transaction. Production networks have no such thing.

use alloy_core::primitives::{Address, U256};
use anyhow::Context;
use url::Url;

use crate::{ConfigError, NetworkConfig, rpc};

/// Balance given to the signer when no amount is requested.
pub const DEFAULT_FUNDING_ETH: f64 = 10.0;

/// Result of a balance override.
#[derive(Debug)]
pub struct FundingResult {
    pub account: Address,
    pub balance_wei: U256,
    /// Whatever the fork returned, usually a pseudo transaction hash.
    pub response: serde_json::Value,
}

/// Fail unless `network` can have balances overridden.
pub fn ensure_supported(network: &NetworkConfig) -> Result<(), ConfigError> {
    if network.is_simulation() {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedOperation {
            operation: "fund-wallet",
            network: network.name.clone(),
        })
    }
}

/// Set `account`'s balance to `amount_eth` on a simulation network.
pub async fn fund_wallet(
    network: &NetworkConfig,
    rpc_url: &Url,
    account: Address,
    amount_eth: f64,
) -> anyhow::Result<FundingResult> {
    ensure_supported(network)?;

    let balance_wei = eth_to_wei(amount_eth)
        .ok_or_else(|| anyhow::anyhow!("Invalid funding amount: {} ETH", amount_eth))?;
    let client = rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?;

    tracing::info!(network = %network.name, %account, amount_eth, "Setting account balance...");

    let response: serde_json::Value = rpc::json_rpc_call(
        &client,
        rpc_url.as_str(),
        "tenderly_setBalance",
        vec![
            serde_json::json!([account]),
            serde_json::json!(format!("0x{:x}", balance_wei)),
        ],
    )
    .await
    .context("Failed to set account balance")?;

    tracing::info!(%account, %response, "Account funded");

    Ok(FundingResult {
        account,
        balance_wei,
        response,
    })
}

/// Convert ETH amount (f64) to wei.
///
/// Rounds to gwei precision (9 decimal places) to avoid floating-point noise,
/// then scales to wei. `None` for negative, non-finite or unrepresentable amounts.
fn eth_to_wei(eth: f64) -> Option<U256> {
    let gwei = (eth * 1e9).round();
    if !gwei.is_finite() || gwei < 0.0 || gwei >= u128::MAX as f64 {
        return None;
    }
    U256::from(gwei as u128).checked_mul(U256::from(1_000_000_000u64))
}
