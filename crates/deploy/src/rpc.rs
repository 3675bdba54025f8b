//! JSON-RPC transport shared by the chain client and the simulation helpers.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A JSON-RPC error object becomes an `anyhow` error carrying the node's message (and revert data
/// when present), so callers can classify it.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    tracing::trace!(method, url, "JSON-RPC request");

    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        match error.get("data").and_then(|d| d.as_str()) {
            Some(data) => anyhow::bail!("RPC error: {} (data: {})", message, data),
            None => anyhow::bail!("RPC error: {}", message),
        }
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {} response", method))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value or `timeout` elapses.
///
/// Returns `Ok(None)` on timeout. Errors from `check_fn` are logged and polling continues.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = tokio::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {
                tracing::trace!(target_name = %name, "Not available yet, polling again...");
            }
            Err(e) => {
                tracing::debug!(error = %e, target_name = %name, "Poll attempt failed, retrying...");
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }

        tokio::time::sleep(interval).await;
    }
}
