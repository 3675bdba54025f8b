//! Two-stage source verification of freshly deployed contracts.
//!
//! Each contract walks the same steps: simulator verification, settling delay, explorer
//! verification. A stage's outcome is recorded and the walk continues whatever it was; nothing in
//! this module can fail a run.

mod etherscan;

use std::time::Duration;

use alloy_core::primitives::Address;
use derive_more::Display;

pub use etherscan::{ETHERSCAN_API_URL, EtherscanVerifier, TENDERLY_API_URL, TenderlyProject};

use crate::{ContractFactory, DeployedContract, VerificationInput};

/// Time the public explorer needs to index a creation transaction.
pub const DEFAULT_SETTLING_DELAY: Duration = Duration::from_secs(60);

/// The two external verification services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VerificationService {
    /// Off-chain simulator / trace service.
    Simulator,
    /// Public block explorer.
    Explorer,
}

/// Outcome of one verification stage.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StageOutcome {
    #[display("verified")]
    Verified,
    #[display("failed: {_0}")]
    Failed(String),
    /// The stage was not attempted.
    #[display("skipped: {_0}")]
    Skipped(String),
}

impl StageOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Terminal verification state of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum VerificationStatus {
    BothVerified,
    PartiallyVerified,
    Unverified,
}

/// What a verifier is asked to verify.
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub contract: &'a DeployedContract,
    pub input: &'a VerificationInput,
}

/// A source verification service.
#[allow(async_fn_in_trait)]
pub trait SourceVerifier {
    fn service(&self) -> VerificationService;

    /// Why this verifier will not be attempted, if it won't.
    fn skip_reason(&self) -> Option<String> {
        None
    }

    /// Submit a verification and report its outcome. Never errors: failures are outcomes.
    async fn verify(&self, request: VerificationRequest<'_>) -> StageOutcome;
}

/// Verification record of a single contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractVerification {
    pub contract: String,
    pub address: Address,
    pub simulator: StageOutcome,
    pub explorer: StageOutcome,
}

impl ContractVerification {
    pub fn status(&self) -> VerificationStatus {
        match (self.simulator.is_verified(), self.explorer.is_verified()) {
            (true, true) => VerificationStatus::BothVerified,
            (false, false) => VerificationStatus::Unverified,
            _ => VerificationStatus::PartiallyVerified,
        }
    }
}

/// Steps of the per-contract state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Simulator,
    Settling,
    Explorer,
    Done,
}

/// Runs both verification stages for deployed contracts.
pub struct VerificationPipeline<S, E> {
    simulator: S,
    explorer: E,
    settling_delay: Duration,
}

impl<S: SourceVerifier, E: SourceVerifier> VerificationPipeline<S, E> {
    pub fn new(simulator: S, explorer: E) -> Self {
        Self {
            simulator,
            explorer,
            settling_delay: DEFAULT_SETTLING_DELAY,
        }
    }

    pub fn with_settling_delay(mut self, delay: Duration) -> Self {
        self.settling_delay = delay;
        self
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn explorer(&self) -> &E {
        &self.explorer
    }

    /// Verify `contract` on both services.
    pub async fn run<F: ContractFactory>(
        &self,
        factory: &F,
        contract: &DeployedContract,
    ) -> ContractVerification {
        let mut record = ContractVerification {
            contract: contract.name.clone(),
            address: contract.address,
            simulator: StageOutcome::Skipped("not attempted".to_string()),
            explorer: StageOutcome::Skipped("not attempted".to_string()),
        };

        let input = match factory.verification_input(&contract.name) {
            Ok(input) => input,
            Err(e) => {
                let reason = format!("build metadata unavailable: {e:#}");
                tracing::warn!(contract = %contract.name, error = %reason, "Cannot verify contract");
                record.simulator = StageOutcome::Failed(reason.clone());
                record.explorer = StageOutcome::Failed(reason);
                return record;
            }
        };
        let request = VerificationRequest {
            contract,
            input: &input,
        };

        let mut step = Step::Simulator;
        while step != Step::Done {
            step = match step {
                Step::Simulator => {
                    record.simulator = Self::attempt(&self.simulator, request).await;
                    Step::Settling
                }
                Step::Settling => {
                    if self.explorer.skip_reason().is_none() && !self.settling_delay.is_zero() {
                        tracing::info!(
                            contract = %contract.name,
                            delay_secs = self.settling_delay.as_secs(),
                            "Waiting for the explorer to index the deployment..."
                        );
                        tokio::time::sleep(self.settling_delay).await;
                    }
                    Step::Explorer
                }
                Step::Explorer => {
                    record.explorer = Self::attempt(&self.explorer, request).await;
                    Step::Done
                }
                Step::Done => Step::Done,
            };
        }

        tracing::info!(
            contract = %record.contract,
            address = %record.address,
            status = %record.status(),
            "Verification finished"
        );

        record
    }

    async fn attempt<V: SourceVerifier>(
        verifier: &V,
        request: VerificationRequest<'_>,
    ) -> StageOutcome {
        let service = verifier.service();

        if let Some(reason) = verifier.skip_reason() {
            tracing::info!(contract = %request.contract.name, %service, %reason, "Skipping verification");
            return StageOutcome::Skipped(reason);
        }

        tracing::info!(
            contract = %request.contract.name,
            address = %request.contract.address,
            %service,
            "Verifying contract..."
        );

        let outcome = verifier.verify(request).await;
        match &outcome {
            StageOutcome::Verified => {
                tracing::info!(contract = %request.contract.name, %service, "Contract verified");
            }
            StageOutcome::Failed(reason) => {
                tracing::error!(contract = %request.contract.name, %service, %reason, "Verification failed");
            }
            StageOutcome::Skipped(reason) => {
                tracing::info!(contract = %request.contract.name, %service, %reason, "Verification skipped");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, TxHash};

    use super::*;
    use crate::testing::{MockFactory, MockVerifier};

    fn deployed(name: &str, last_byte: u8) -> DeployedContract {
        DeployedContract {
            name: name.to_string(),
            address: Address::with_last_byte(last_byte),
            constructor_args: vec![],
            tx_hash: TxHash::ZERO,
        }
    }

    #[tokio::test]
    async fn test_both_stages_verified() {
        let pipeline = VerificationPipeline::new(
            MockVerifier::new(VerificationService::Simulator),
            MockVerifier::new(VerificationService::Explorer),
        )
        .with_settling_delay(Duration::ZERO);

        let record = pipeline
            .run(&MockFactory::default(), &deployed("TychoRouter", 1))
            .await;

        assert_eq!(record.simulator, StageOutcome::Verified);
        assert_eq!(record.explorer, StageOutcome::Verified);
        assert_eq!(record.status(), VerificationStatus::BothVerified);
    }

    #[tokio::test]
    async fn test_simulator_failure_does_not_block_explorer() {
        let simulator = MockVerifier::new(VerificationService::Simulator).failing("TychoRouter");
        let explorer = MockVerifier::new(VerificationService::Explorer);
        let pipeline =
            VerificationPipeline::new(simulator, explorer).with_settling_delay(Duration::ZERO);

        let record = pipeline
            .run(&MockFactory::default(), &deployed("TychoRouter", 1))
            .await;

        assert!(matches!(record.simulator, StageOutcome::Failed(_)));
        assert_eq!(record.explorer, StageOutcome::Verified);
        assert_eq!(record.status(), VerificationStatus::PartiallyVerified);
        assert_eq!(pipeline.explorer.attempts(), vec!["TychoRouter".to_string()]);
    }

    #[tokio::test]
    async fn test_each_stage_attempted_once() {
        let pipeline = VerificationPipeline::new(
            MockVerifier::new(VerificationService::Simulator).failing("UniswapV2Executor"),
            MockVerifier::new(VerificationService::Explorer).failing("UniswapV2Executor"),
        )
        .with_settling_delay(Duration::ZERO);

        let record = pipeline
            .run(&MockFactory::default(), &deployed("UniswapV2Executor", 2))
            .await;

        assert_eq!(record.status(), VerificationStatus::Unverified);
        assert_eq!(pipeline.simulator.attempts().len(), 1);
        assert_eq!(pipeline.explorer.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settling_delay_precedes_explorer() {
        let pipeline = VerificationPipeline::new(
            MockVerifier::new(VerificationService::Simulator),
            MockVerifier::new(VerificationService::Explorer),
        );

        let start = tokio::time::Instant::now();
        pipeline
            .run(&MockFactory::default(), &deployed("TychoRouter", 1))
            .await;

        let simulator_at = pipeline.simulator.attempt_times()[0];
        let explorer_at = pipeline.explorer.attempt_times()[0];
        assert!(simulator_at - start < DEFAULT_SETTLING_DELAY);
        assert!(explorer_at - simulator_at >= DEFAULT_SETTLING_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_explorer_has_no_delay() {
        let pipeline = VerificationPipeline::new(
            MockVerifier::new(VerificationService::Simulator),
            MockVerifier::new(VerificationService::Explorer).skipping("simulation network"),
        );

        let start = tokio::time::Instant::now();
        let record = pipeline
            .run(&MockFactory::default(), &deployed("TychoRouter", 1))
            .await;

        assert!(start.elapsed() < DEFAULT_SETTLING_DELAY);
        assert_eq!(
            record.explorer,
            StageOutcome::Skipped("simulation network".to_string())
        );
        assert!(pipeline.explorer.attempts().is_empty());
        assert_eq!(record.status(), VerificationStatus::PartiallyVerified);
    }

    #[tokio::test]
    async fn test_missing_build_metadata() {
        let pipeline = VerificationPipeline::new(
            MockVerifier::new(VerificationService::Simulator),
            MockVerifier::new(VerificationService::Explorer),
        )
        .with_settling_delay(Duration::ZERO);

        let record = pipeline
            .run(
                &MockFactory::default().without("TychoRouter"),
                &deployed("TychoRouter", 1),
            )
            .await;

        assert_eq!(record.status(), VerificationStatus::Unverified);
        assert!(pipeline.simulator.attempts().is_empty());
    }
}
