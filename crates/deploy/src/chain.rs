//! The narrow chain-interaction interface the orchestrator is written against.
//!
//! Signing, nonce management and gas estimation are the node's business: transactions are handed
//! over with `eth_sendTransaction` from the signer account, and the client only waits for receipts.

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, TxHash, U256};
use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::{ConfigError, ConfirmationTimeout, rpc};

/// Default upper bound on waiting for a transaction receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval between `eth_getTransactionReceipt` polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A state-mutating call. `to = None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    /// Explicit gas limit; the node estimates when absent.
    pub gas: Option<u64>,
}

impl TxRequest {
    pub fn create(code: Bytes) -> Self {
        Self {
            to: None,
            data: code,
            gas: None,
        }
    }

    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            data,
            gas: None,
        }
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }
}

/// Receipt of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: bool,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_u64_from_hex(deserializer).map(|status| status == 1)
}

/// Chain reads and writes used by the orchestrator.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// The account that signs every transaction of the run.
    async fn signer(&self) -> anyhow::Result<Address>;

    /// Native balance of `account`.
    async fn balance(&self, account: Address) -> anyhow::Result<U256>;

    /// Read-only call against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes>;

    /// Submit a transaction from the signer and return its hash.
    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<TxHash>;

    /// Wait until `tx_hash` is mined. Gives up with [`ConfirmationTimeout`].
    async fn await_confirmation(&self, tx_hash: TxHash) -> anyhow::Result<TxReceipt>;

    /// Submit a transaction and wait for its receipt.
    async fn submit(&self, tx: TxRequest) -> anyhow::Result<TxReceipt> {
        let tx_hash = self.send_transaction(tx).await?;
        tracing::info!(%tx_hash, "Transaction submitted, awaiting confirmation...");
        self.await_confirmation(tx_hash).await
    }
}

/// [`ChainClient`] speaking JSON-RPC to a node that holds the signer's key.
#[derive(Debug, Clone)]
pub struct JsonRpcChainClient {
    client: reqwest::Client,
    rpc_url: Url,
    sender: Option<Address>,
    confirmation_timeout: Duration,
}

impl JsonRpcChainClient {
    pub fn new(rpc_url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?,
            rpc_url,
            sender: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        })
    }

    /// Sign with `sender` instead of the node's first account.
    pub fn with_sender(mut self, sender: Option<Address>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> anyhow::Result<T> {
        rpc::json_rpc_call(&self.client, self.rpc_url.as_str(), method, params).await
    }
}

impl ChainClient for JsonRpcChainClient {
    async fn signer(&self) -> anyhow::Result<Address> {
        if let Some(sender) = self.sender {
            return Ok(sender);
        }

        let accounts: Vec<Address> = self
            .rpc("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;

        accounts
            .first()
            .copied()
            .ok_or_else(|| ConfigError::MissingSetting("DEPLOYER_ADDRESS").into())
    }

    async fn balance(&self, account: Address) -> anyhow::Result<U256> {
        self.rpc(
            "eth_getBalance",
            vec![serde_json::json!(account), serde_json::json!("latest")],
        )
        .await
        .context("Failed to fetch signer balance")
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.rpc(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": data }),
                serde_json::json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("eth_call to {} failed", to))
    }

    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<TxHash> {
        let from = self.signer().await?;

        let mut params = serde_json::json!({ "from": from, "data": tx.data });
        if let Some(to) = tx.to {
            params["to"] = serde_json::json!(to);
        }
        if let Some(gas) = tx.gas {
            params["gas"] = serde_json::json!(format!("0x{:x}", gas));
        }

        self.rpc("eth_sendTransaction", vec![params]).await
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> anyhow::Result<TxReceipt> {
        let receipt = rpc::poll_until(
            "transaction receipt",
            self.confirmation_timeout,
            RECEIPT_POLL_INTERVAL,
            || async {
                self.rpc::<Option<TxReceipt>>(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await
            },
        )
        .await;

        match receipt {
            Some(receipt) => {
                tracing::debug!(
                    %tx_hash,
                    block_number = receipt.block_number,
                    gas_used = receipt.gas_used,
                    status = receipt.status,
                    "Transaction confirmed"
                );
                Ok(receipt)
            }
            None => Err(ConfirmationTimeout { tx_hash }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_deserialization() {
        let receipt: TxReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x5208",
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, 436);
        assert!(receipt.status);
        assert_eq!(receipt.gas_used, 21000);
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TxReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x10",
            "status": "0x0",
            "contractAddress": null,
            "gasUsed": "0x0"
        }))
        .unwrap();

        assert!(!receipt.status);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_tx_request_builders() {
        let create = TxRequest::create(Bytes::from_static(&[0x60, 0x80]));
        assert!(create.to.is_none());
        assert!(create.gas.is_none());

        let call = TxRequest::call(Address::ZERO, Bytes::new()).with_gas(150_000);
        assert_eq!(call.to, Some(Address::ZERO));
        assert_eq!(call.gas, Some(150_000));
    }
}
