//! routerctl-deploy - Deployment and permission orchestration for the swap router.
//!
//! This crate deploys the router and its executor contracts, verifies their sources on a
//! simulator and a public explorer, registers executors on the router and grants its
//! access-control roles.

mod artifacts;
pub use artifacts::{ContractFactory, FoundryArtifacts, VerificationInput};

mod chain;
pub use chain::{ChainClient, DEFAULT_CONFIRMATION_TIMEOUT, JsonRpcChainClient, TxReceipt, TxRequest};

mod confirm;
pub use confirm::{AutoApprove, Confirm, ExecutorProposal, Prompt};

mod contracts;
pub use contracts::{
    ConstructorArg, GAS_PER_EXECUTOR, ROUTER_CONTRACT, Role, RouterCall, encode_constructor_args,
};

mod deployer;
pub use deployer::{ContractDeployer, DeployedContract};

mod deployment;
pub use deployment::{DeploymentRecord, DeploymentReport, DeploymentRun, log_signer};

mod error;
pub use error::{ConfigError, ConfirmationTimeout, DeploymentError};

pub mod faucet;

mod network;
pub use network::{ExecutorSpec, NetworkConfig, NetworkKind, NetworkTable};

mod registry;
pub use registry::{
    ExecutorDeclarations, ExecutorEntry, ExecutorReconciler, ReconcileOutcome, ReconcilePlan,
};

mod roles;
pub use roles::{ProvisionReport, RoleDeclarations, RoleGrant, RoleOutcome, RoleProvisioner};

pub mod rpc;

mod settings;
pub use settings::{DEFAULT_SETTINGS_FILE, ENV_PREFIX, Settings, TenderlySettings};

mod verify;
pub use verify::{
    ContractVerification, DEFAULT_SETTLING_DELAY, ETHERSCAN_API_URL, EtherscanVerifier,
    SourceVerifier, StageOutcome, TENDERLY_API_URL, TenderlyProject, VerificationPipeline,
    VerificationRequest, VerificationService, VerificationStatus,
};

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
