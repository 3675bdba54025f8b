//! Contract deployment driver.

use alloy_core::primitives::{Address, TxHash};
use anyhow::Context;

use crate::{
    ChainClient, ConfirmationTimeout, ConstructorArg, ContractFactory, DeploymentError, TxRequest,
};

/// A contract created on chain by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    /// Logical contract name (artifact name).
    pub name: String,
    pub address: Address,
    pub constructor_args: Vec<ConstructorArg>,
    /// Hash of the creation transaction.
    pub tx_hash: TxHash,
}

/// Submits contract-creation transactions and waits for them to be mined.
///
/// Deployment is not idempotent, so nothing here retries: every failure is returned to the caller.
pub struct ContractDeployer<'a, C, F> {
    chain: &'a C,
    factory: &'a F,
}

impl<'a, C: ChainClient, F: ContractFactory> ContractDeployer<'a, C, F> {
    pub fn new(chain: &'a C, factory: &'a F) -> Self {
        Self { chain, factory }
    }

    /// Deploy `name` with `args` and block until the creation transaction is confirmed.
    pub async fn deploy(
        &self,
        name: &str,
        args: &[ConstructorArg],
    ) -> anyhow::Result<DeployedContract> {
        let code = self
            .factory
            .creation_code(name, args)
            .with_context(|| format!("Failed to build creation code for {}", name))?;

        tracing::info!(contract = name, args = ?args, code_size = code.len(), "Deploying contract...");

        let tx_hash = self
            .chain
            .send_transaction(TxRequest::create(code))
            .await
            .map_err(|e| DeploymentError::from_rejection(name, &e))?;

        tracing::info!(contract = name, %tx_hash, "Creation transaction submitted, awaiting confirmation...");

        let receipt = self
            .chain
            .await_confirmation(tx_hash)
            .await
            .map_err(|e| match e.downcast::<ConfirmationTimeout>() {
                Ok(timeout) => DeploymentError::Timeout {
                    contract: name.to_string(),
                    tx_hash: timeout.tx_hash,
                }
                .into(),
                Err(e) => e,
            })?;

        if !receipt.status {
            return Err(DeploymentError::Reverted {
                contract: name.to_string(),
                tx_hash,
            }
            .into());
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| DeploymentError::MissingContractAddress {
                contract: name.to_string(),
                tx_hash,
            })?;

        tracing::info!(
            contract = name,
            %address,
            %tx_hash,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            "Contract deployed"
        );

        Ok(DeployedContract {
            name: name.to_string(),
            address,
            constructor_args: args.to_vec(),
            tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;
    use crate::testing::{MockChain, MockFactory};

    #[tokio::test]
    async fn test_deploy_returns_contract_address() {
        let chain = MockChain::default();
        let factory = MockFactory::default();
        let deployer = ContractDeployer::new(&chain, &factory);

        let args = vec![ConstructorArg::Address(address!(
            "1F98431c8aD98523631AE4a59f267346ea31F984"
        ))];
        let deployed = deployer.deploy("UniswapV3Executor", &args).await.unwrap();

        assert_eq!(deployed.name, "UniswapV3Executor");
        assert_eq!(deployed.constructor_args, args);
        assert_eq!(chain.deployments(), vec![deployed.address]);
        assert_eq!(chain.sent().len(), 1);
        assert!(chain.sent()[0].to.is_none());
    }

    #[tokio::test]
    async fn test_deploy_rejected_is_fatal() {
        let chain = MockChain::default();
        chain.reject_next("insufficient funds for gas * price + value");
        let factory = MockFactory::default();

        let err = ContractDeployer::new(&chain, &factory)
            .deploy("TychoRouter", &[])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeploymentError>(),
            Some(DeploymentError::InsufficientFunds { .. })
        ));
        assert!(chain.deployments().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_reverted_is_fatal() {
        let chain = MockChain::default();
        chain.revert_next();
        let factory = MockFactory::default();

        let err = ContractDeployer::new(&chain, &factory)
            .deploy("TychoRouter", &[])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeploymentError>(),
            Some(DeploymentError::Reverted { contract, .. }) if contract == "TychoRouter"
        ));
    }

    #[tokio::test]
    async fn test_unconfirmed_deployment_names_the_contract() {
        let chain = MockChain::default();
        chain.stall_next();
        let factory = MockFactory::default();

        let err = ContractDeployer::new(&chain, &factory)
            .deploy("UniswapV4Executor", &[])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeploymentError>(),
            Some(DeploymentError::Timeout { contract, .. }) if contract == "UniswapV4Executor"
        ));
        assert!(err.to_string().contains("UniswapV4Executor"));
    }

    #[tokio::test]
    async fn test_deploy_missing_artifact() {
        let chain = MockChain::default();
        let factory = MockFactory::default().without("UniswapV2Executor");

        let result = ContractDeployer::new(&chain, &factory)
            .deploy("UniswapV2Executor", &[])
            .await;

        assert!(result.is_err());
        assert!(chain.sent().is_empty());
    }
}
