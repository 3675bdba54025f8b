//! Error taxonomy for the orchestrator.
//!
//! Only failures that must abort a run are errors. Verification failures, "nothing to do" and operator
//! refusals are ordinary outcome values (see [`crate::StageOutcome`] and [`crate::ReconcileOutcome`]).

use alloy_core::primitives::TxHash;

/// Failures detected before any chain interaction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The network identifier has no entry in the network table.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// A value required for this operation was not provided.
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
    /// A declaration file could not be interpreted.
    #[error("invalid declaration in {path}: {reason}")]
    InvalidDeclaration { path: String, reason: String },
    /// The operation is not available on this kind of network.
    #[error("{operation} is not supported on network {network}")]
    UnsupportedOperation {
        operation: &'static str,
        network: String,
    },
}

/// Failures of a contract-creation transaction. Always fatal, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("transaction for {contract} was rejected: {reason}")]
    Rejected { contract: String, reason: String },
    #[error("signer cannot pay for {contract}: {reason}")]
    InsufficientFunds { contract: String, reason: String },
    #[error("transaction {tx_hash} for {contract} reverted")]
    Reverted { contract: String, tx_hash: TxHash },
    #[error("timed out waiting for confirmation of {tx_hash} for {contract}")]
    Timeout { contract: String, tx_hash: TxHash },
    #[error("receipt of {tx_hash} for {contract} carries no contract address")]
    MissingContractAddress { contract: String, tx_hash: TxHash },
}

/// A submitted transaction was not mined within the confirmation timeout.
#[derive(Debug, thiserror::Error)]
#[error("timed out waiting for confirmation of {tx_hash}")]
pub struct ConfirmationTimeout {
    pub tx_hash: TxHash,
}

impl DeploymentError {
    /// Classify a node's rejection of a creation transaction.
    pub fn from_rejection(contract: &str, err: &anyhow::Error) -> Self {
        let reason = format!("{err:#}");
        if reason.to_lowercase().contains("insufficient funds") {
            Self::InsufficientFunds {
                contract: contract.to_string(),
                reason,
            }
        } else {
            Self::Rejected {
                contract: contract.to_string(),
                reason,
            }
        }
    }
}
