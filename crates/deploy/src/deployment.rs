//! Deployment runs: create contracts one by one and verify each before moving on.

use alloy_core::primitives::utils::format_ether;

use crate::{
    ChainClient, ConstructorArg, ContractDeployer, ContractFactory, ContractVerification,
    DeployedContract, NetworkConfig, ROUTER_CONTRACT, SourceVerifier, VerificationPipeline,
    VerificationStatus,
};

/// A deployed contract and its verification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub contract: DeployedContract,
    pub verification: ContractVerification,
}

/// Everything a deployment run created, in deployment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReport {
    pub network: String,
    pub records: Vec<DeploymentRecord>,
}

impl DeploymentReport {
    pub fn contracts(&self) -> impl Iterator<Item = &DeployedContract> {
        self.records.iter().map(|record| &record.contract)
    }

    /// Number of contracts that were not verified on both services.
    pub fn incomplete_verifications(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.verification.status() != VerificationStatus::BothVerified)
            .count()
    }
}

/// Log the signing account and its balance before any transaction is sent.
pub async fn log_signer<C: ChainClient>(chain: &C, network: &NetworkConfig) -> anyhow::Result<()> {
    let signer = chain.signer().await?;
    let balance = chain.balance(signer).await?;
    tracing::info!(
        network = %network.name,
        chain_id = network.chain_id,
        %signer,
        balance_eth = %format_ether(balance),
        "Signing with account"
    );
    Ok(())
}

/// Deploys a list of contracts on one network, verifying each right after it is mined.
pub struct DeploymentRun<'a, C, F, S, E> {
    chain: &'a C,
    factory: &'a F,
    pipeline: &'a VerificationPipeline<S, E>,
    network: &'a NetworkConfig,
}

impl<'a, C, F, S, E> DeploymentRun<'a, C, F, S, E>
where
    C: ChainClient,
    F: ContractFactory,
    S: SourceVerifier,
    E: SourceVerifier,
{
    pub fn new(
        chain: &'a C,
        factory: &'a F,
        pipeline: &'a VerificationPipeline<S, E>,
        network: &'a NetworkConfig,
    ) -> Self {
        Self {
            chain,
            factory,
            pipeline,
            network,
        }
    }

    /// Deploy and verify the router with the network's permit2 and wrapped native token addresses.
    pub async fn deploy_router(&self) -> anyhow::Result<DeploymentReport> {
        self.deploy_all(&[(ROUTER_CONTRACT.to_string(), self.network.router_args())])
            .await
    }

    /// Deploy and verify every executor configured for the network, in configuration order.
    pub async fn deploy_executors(&self) -> anyhow::Result<DeploymentReport> {
        let specs: Vec<(String, Vec<ConstructorArg>)> = self
            .network
            .executors
            .iter()
            .map(|spec| (spec.name.clone(), spec.args.clone()))
            .collect();

        if specs.is_empty() {
            tracing::warn!(network = %self.network.name, "No executors configured for network");
        }

        self.deploy_all(&specs).await
    }

    /// A deployment failure ends the run: later contracts are not attempted.
    async fn deploy_all(
        &self,
        specs: &[(String, Vec<ConstructorArg>)],
    ) -> anyhow::Result<DeploymentReport> {
        let deployer = ContractDeployer::new(self.chain, self.factory);
        let mut records = Vec::with_capacity(specs.len());

        for (index, (name, args)) in specs.iter().enumerate() {
            tracing::info!(
                network = %self.network.name,
                contract = %name,
                progress = format!("{}/{}", index + 1, specs.len()),
                "Starting deployment"
            );

            let contract = match deployer.deploy(name, args).await {
                Ok(contract) => contract,
                Err(e) => {
                    for deployed in records.iter().map(|r: &DeploymentRecord| &r.contract) {
                        tracing::error!(
                            contract = %deployed.name,
                            address = %deployed.address,
                            "Deployed before the failure"
                        );
                    }
                    return Err(e);
                }
            };

            let verification = self.pipeline.run(self.factory, &contract).await;
            records.push(DeploymentRecord {
                contract,
                verification,
            });
        }

        Ok(DeploymentReport {
            network: self.network.name.clone(),
            records,
        })
    }
}
