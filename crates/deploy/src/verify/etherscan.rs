//! Client for the Etherscan source-verification protocol.
//!
//! Etherscan's multichain API serves the public explorer stage. Tenderly accepts the same
//! protocol, so the simulator stage uses this client too, pointed at Tenderly.

use std::time::Duration;

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use url::Url;

use super::{SourceVerifier, StageOutcome, VerificationRequest, VerificationService};
use crate::{NetworkConfig, contracts::encode_constructor_args, rpc};

/// Etherscan multichain API endpoint.
pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Tenderly REST API root.
pub const TENDERLY_API_URL: &str = "https://api.tenderly.co/api/v1";

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_MAX_POLLS: usize = 24;

/// Tenderly project that receives verified sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenderlyProject {
    pub account: String,
    pub project: String,
    pub access_key: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: String,
}

/// Outcome of a `verifysourcecode` submission.
#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Accepted { guid: String },
    AlreadyVerified,
    Rejected(String),
}

/// Outcome of a `checkverifystatus` poll.
#[derive(Debug, PartialEq, Eq)]
enum CheckStatus {
    Pending,
    Verified,
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
#[error("verification still pending")]
struct StillPending;

fn is_already_verified(text: &str) -> bool {
    text.to_lowercase().contains("already verified")
}

fn classify_submission(response: &ApiResponse) -> Submission {
    if response.status == "1" {
        return Submission::Accepted {
            guid: response.result.clone(),
        };
    }

    if is_already_verified(&response.result) || is_already_verified(&response.message) {
        Submission::AlreadyVerified
    } else {
        Submission::Rejected(format!("{}: {}", response.message, response.result))
    }
}

fn classify_status(response: &ApiResponse) -> CheckStatus {
    let result = response.result.to_lowercase();
    if result.contains("pending") || result.contains("in progress") {
        CheckStatus::Pending
    } else if response.status == "1" || result.contains("pass - verified") || is_already_verified(&result) {
        CheckStatus::Verified
    } else {
        CheckStatus::Failed(response.result.clone())
    }
}

/// [`SourceVerifier`] speaking the Etherscan verification API.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    service: VerificationService,
    api_url: Url,
    api_key: Option<String>,
    skip_reason: Option<String>,
    status_poll_interval: Duration,
    status_max_polls: usize,
}

impl EtherscanVerifier {
    fn new(service: VerificationService, api_url: Url, api_key: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?,
            service,
            api_url,
            api_key,
            skip_reason: None,
            status_poll_interval: STATUS_POLL_INTERVAL,
            status_max_polls: STATUS_MAX_POLLS,
        })
    }

    /// Check the status every `interval`, at most `max_polls` times in total.
    pub fn with_status_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.status_poll_interval = interval;
        self.status_max_polls = max_polls.max(1);
        self
    }

    /// Public explorer verifier for `network`.
    ///
    /// Simulation networks are never indexed by the explorer, so the stage is skipped there.
    pub fn explorer(network: &NetworkConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let mut api_url = Url::parse(ETHERSCAN_API_URL).context("Invalid Etherscan API URL")?;
        api_url
            .query_pairs_mut()
            .append_pair("chainid", &network.chain_id.to_string());

        let mut verifier = Self::new(VerificationService::Explorer, api_url, api_key)?;
        if network.is_simulation() {
            verifier.skip_reason = Some(format!("{} is a simulation network", network.name));
        } else if verifier.api_key.is_none() {
            verifier.skip_reason = Some("no explorer API key configured".to_string());
        }
        Ok(verifier)
    }

    /// Simulator verifier for `network`.
    ///
    /// On simulation networks sources go to the fork's own endpoint under `rpc_url`; production
    /// deployments are verified into the configured Tenderly project.
    pub fn simulator(
        network: &NetworkConfig,
        rpc_url: &Url,
        project: Option<&TenderlyProject>,
    ) -> anyhow::Result<Self> {
        let Some(project) = project else {
            let mut verifier = Self::new(
                VerificationService::Simulator,
                Url::parse(TENDERLY_API_URL).context("Invalid Tenderly API URL")?,
                None,
            )?;
            verifier.skip_reason = Some("no simulator project configured".to_string());
            return Ok(verifier);
        };

        let api_url = if network.is_simulation() {
            Url::parse(&format!(
                "{}/verify/etherscan",
                rpc_url.as_str().trim_end_matches('/')
            ))
        } else {
            Url::parse(&format!(
                "{}/account/{}/project/{}/etherscan/verify/network/{}",
                TENDERLY_API_URL, project.account, project.project, network.chain_id
            ))
        }
        .context("Invalid simulator verification URL")?;

        Self::new(
            VerificationService::Simulator,
            api_url,
            Some(project.access_key.clone()),
        )
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    async fn submit(&self, request: VerificationRequest<'_>) -> anyhow::Result<Submission> {
        let source = serde_json::to_string(&request.input.standard_json_input)
            .context("Failed to serialize standard JSON input")?;
        let constructor_args = hex::encode(encode_constructor_args(&request.contract.constructor_args));
        let address = request.contract.address.to_string();
        let api_key = self.api_key.as_deref().unwrap_or_default();

        let response: ApiResponse = self
            .client
            .post(self.api_url.clone())
            .form(&[
                ("module", "contract"),
                ("action", "verifysourcecode"),
                ("apikey", api_key),
                ("contractaddress", address.as_str()),
                ("sourceCode", source.as_str()),
                ("codeformat", "solidity-standard-json-input"),
                ("contractname", request.input.contract_identifier.as_str()),
                ("compilerversion", request.input.compiler_version.as_str()),
                // sic: the API's spelling
                ("constructorArguements", constructor_args.as_str()),
            ])
            .send()
            .await
            .context("Failed to submit verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        Ok(classify_submission(&response))
    }

    async fn check_status(&self, guid: &str) -> anyhow::Result<StageOutcome> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let response: ApiResponse = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
                ("apikey", api_key),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        match classify_status(&response) {
            CheckStatus::Pending => Err(StillPending.into()),
            CheckStatus::Verified => Ok(StageOutcome::Verified),
            CheckStatus::Failed(reason) => Ok(StageOutcome::Failed(reason)),
        }
    }
}

impl SourceVerifier for EtherscanVerifier {
    fn service(&self) -> VerificationService {
        self.service
    }

    fn skip_reason(&self) -> Option<String> {
        self.skip_reason.clone()
    }

    async fn verify(&self, request: VerificationRequest<'_>) -> StageOutcome {
        let guid = match self.submit(request).await {
            Ok(Submission::Accepted { guid }) => guid,
            Ok(Submission::AlreadyVerified) => return StageOutcome::Verified,
            Ok(Submission::Rejected(reason)) => return StageOutcome::Failed(reason),
            Err(e) => return StageOutcome::Failed(format!("{e:#}")),
        };

        tracing::debug!(service = %self.service, %guid, "Verification submitted, polling status...");

        let status = (|| self.check_status(&guid))
            .retry(
                // The first check is not a retry.
                ConstantBuilder::default()
                    .with_delay(self.status_poll_interval)
                    .with_max_times(self.status_max_polls - 1),
            )
            .sleep(tokio::time::sleep)
            .when(|e: &anyhow::Error| e.is::<StillPending>())
            .await;

        match status {
            Ok(outcome) => outcome,
            Err(e) if e.is::<StillPending>() => StageOutcome::Failed(format!(
                "still pending after {} status checks",
                self.status_max_polls
            )),
            Err(e) => StageOutcome::Failed(format!("{e:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use alloy_core::primitives::{Address, TxHash};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;
    use crate::{DeployedContract, NetworkTable, VerificationInput};

    fn response(status: &str, message: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.to_string(),
            message: message.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_classify_submission() {
        assert_eq!(
            classify_submission(&response("1", "OK", "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn")),
            Submission::Accepted {
                guid: "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn".to_string()
            }
        );
        assert_eq!(
            classify_submission(&response("0", "NOTOK", "Contract source code already verified")),
            Submission::AlreadyVerified
        );
        assert!(matches!(
            classify_submission(&response(
                "0",
                "NOTOK",
                "Unable to locate ContractCode at 0x5fbdb2315678afecb367f032d93f642f64180aa3"
            )),
            Submission::Rejected(reason) if reason.contains("Unable to locate")
        ));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(&response("0", "NOTOK", "Pending in queue")),
            CheckStatus::Pending
        );
        assert_eq!(
            classify_status(&response("1", "OK", "Pass - Verified")),
            CheckStatus::Verified
        );
        assert_eq!(
            classify_status(&response("0", "NOTOK", "Already Verified")),
            CheckStatus::Verified
        );
        assert_eq!(
            classify_status(&response("0", "NOTOK", "Fail - Unable to verify")),
            CheckStatus::Failed("Fail - Unable to verify".to_string())
        );
    }

    #[test]
    fn test_explorer_endpoint() {
        let table = NetworkTable::builtin().unwrap();

        let base = EtherscanVerifier::explorer(table.resolve("base").unwrap(), Some("key".into()))
            .unwrap();
        assert_eq!(
            base.api_url().as_str(),
            "https://api.etherscan.io/v2/api?chainid=8453"
        );
        assert!(base.skip_reason().is_none());

        let keyless = EtherscanVerifier::explorer(table.resolve("base").unwrap(), None).unwrap();
        assert!(keyless.skip_reason().is_some());

        let tenderly =
            EtherscanVerifier::explorer(table.resolve("tenderly").unwrap(), Some("key".into()))
                .unwrap();
        assert!(tenderly.skip_reason().is_some());
    }

    #[test]
    fn test_simulator_endpoint() {
        let table = NetworkTable::builtin().unwrap();
        let project = TenderlyProject {
            account: "acme".to_string(),
            project: "router".to_string(),
            access_key: "secret".to_string(),
        };
        let rpc_url = Url::parse("https://virtual.mainnet.rpc.tenderly.co/abc-123/").unwrap();

        let production =
            EtherscanVerifier::simulator(table.resolve("base").unwrap(), &rpc_url, Some(&project))
                .unwrap();
        assert_eq!(
            production.api_url().as_str(),
            "https://api.tenderly.co/api/v1/account/acme/project/router/etherscan/verify/network/8453"
        );

        let fork = EtherscanVerifier::simulator(
            table.resolve("tenderly").unwrap(),
            &rpc_url,
            Some(&project),
        )
        .unwrap();
        assert_eq!(
            fork.api_url().as_str(),
            "https://virtual.mainnet.rpc.tenderly.co/abc-123/verify/etherscan"
        );
        assert!(fork.skip_reason().is_none());

        let unconfigured =
            EtherscanVerifier::simulator(table.resolve("base").unwrap(), &rpc_url, None).unwrap();
        assert!(unconfigured.skip_reason().is_some());
    }

    /// Read one HTTP request, headers and body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Verification endpoint that accepts every submission and never finishes checking it.
    async fn pending_endpoint(checks: Arc<AtomicUsize>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let checks = checks.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let body = if request.contains("checkverifystatus") {
                        checks.fetch_add(1, Ordering::SeqCst);
                        r#"{"status":"0","message":"NOTOK","result":"Pending in queue"}"#
                    } else {
                        r#"{"status":"1","message":"OK","result":"guid-1"}"#
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        Url::parse(&format!("http://{addr}/api")).unwrap()
    }

    #[tokio::test]
    async fn test_pending_verification_gives_up_after_max_polls() {
        let checks = Arc::new(AtomicUsize::new(0));
        let api_url = pending_endpoint(checks.clone()).await;
        let verifier = EtherscanVerifier::new(VerificationService::Explorer, api_url, Some("key".into()))
            .unwrap()
            .with_status_polling(Duration::from_millis(1), 3);

        let contract = DeployedContract {
            name: "UniswapV2Executor".to_string(),
            address: Address::with_last_byte(0xb),
            constructor_args: vec![],
            tx_hash: TxHash::ZERO,
        };
        let input = VerificationInput {
            contract_identifier: "src/UniswapV2Executor.sol:UniswapV2Executor".to_string(),
            compiler_version: "v0.8.26+commit.8a97fa7a".to_string(),
            standard_json_input: serde_json::json!({ "language": "Solidity" }),
        };

        let outcome = verifier
            .verify(VerificationRequest {
                contract: &contract,
                input: &input,
            })
            .await;

        assert_eq!(
            outcome,
            StageOutcome::Failed("still pending after 3 status checks".to_string())
        );
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }
}
