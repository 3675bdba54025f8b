//! routerctl deploys the swap router and its executors, verifies their sources and manages the
//! router's executor registry and access-control roles.

mod cli;
mod report;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use routerctl_deploy::{
    AutoApprove, ChainClient, DeploymentRun, EtherscanVerifier, ExecutorDeclarations,
    ExecutorReconciler, FoundryArtifacts, JsonRpcChainClient, NetworkConfig, NetworkTable, Prompt,
    RoleDeclarations, RoleProvisioner, Settings, VerificationPipeline, faucet, log_signer,
};

/// What a deployment run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Router,
    Executors { record: bool },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let table = match &cli.networks {
        Some(path) => NetworkTable::load_from_file(path)?,
        None => NetworkTable::builtin()?,
    };
    let network = table.resolve(&cli.network).inspect_err(|_| {
        let supported: Vec<&str> = table.names().collect();
        tracing::error!(?supported, "Unknown network");
    })?;
    let settings = Settings::load(&cli.config)?;

    tracing::info!(
        network = %network.name,
        chain_id = network.chain_id,
        kind = %network.kind,
        rpc_url = %cli.rpc_url,
        "Resolved network"
    );

    let chain = JsonRpcChainClient::new(cli.rpc_url.clone())?
        .with_sender(cli.deployer)
        .with_confirmation_timeout(settings.confirmation_timeout());

    // Each command checks its local inputs before the first chain call.
    match cli.command {
        Command::DeployRouter => {
            deploy(&chain, network, &settings, &cli, Target::Router).await?;
        }
        Command::DeployExecutors { record } => {
            deploy(&chain, network, &settings, &cli, Target::Executors { record }).await?;
        }
        Command::SetExecutors { ref router, yes } => {
            let declarations = executor_declarations(&settings, network)?;
            log_signer(&chain, network).await?;

            let reconciler = ExecutorReconciler::new(&chain, router.router, &declarations);

            let outcome = if yes {
                reconciler.reconcile(&network.name, &mut AutoApprove).await?
            } else {
                reconciler
                    .reconcile(&network.name, &mut Prompt::stdio())
                    .await?
            };

            println!("{}", report::reconcile_summary(&network.name, &outcome));
        }
        Command::SetRoles { ref router } => {
            let declarations = RoleDeclarations::load(&settings.roles_file)?;
            log_signer(&chain, network).await?;

            let report = RoleProvisioner::new(&chain, router.router, &declarations)
                .provision(&network.name)
                .await;

            println!("{}", report::provision_table(&report));

            let failed = report.failures().count();
            if failed > 0 {
                tracing::warn!(failed, "Some roles could not be granted");
            }
        }
        Command::FundWallet { account, amount } => {
            faucet::ensure_supported(network)?;

            let account = match account {
                Some(account) => account,
                None => chain.signer().await?,
            };
            let result = faucet::fund_wallet(network, &cli.rpc_url, account, amount).await?;

            println!("Funded {} with {} ETH", result.account, amount);
        }
    }

    Ok(())
}

/// Load the executor declarations and make sure `network` has a valid entry.
fn executor_declarations(
    settings: &Settings,
    network: &NetworkConfig,
) -> Result<ExecutorDeclarations> {
    let declarations = ExecutorDeclarations::load(&settings.executors_file)?;
    declarations.entries(&network.name)?;
    Ok(declarations)
}

/// Deploy the router or the executors, then print the verification summary.
async fn deploy(
    chain: &JsonRpcChainClient,
    network: &NetworkConfig,
    settings: &Settings,
    cli: &Cli,
    target: Target,
) -> Result<()> {
    let factory = FoundryArtifacts::new(&settings.artifacts_dir);
    let simulator = EtherscanVerifier::simulator(
        network,
        &cli.rpc_url,
        settings.tenderly_project().as_ref(),
    )?;
    let explorer = EtherscanVerifier::explorer(network, settings.etherscan_api_key.clone())?;
    let pipeline =
        VerificationPipeline::new(simulator, explorer).with_settling_delay(settings.settling_delay());

    log_signer(chain, network).await?;

    let run = DeploymentRun::new(chain, &factory, &pipeline, network);
    let report = match target {
        Target::Router => run.deploy_router().await?,
        Target::Executors { .. } => run.deploy_executors().await?,
    };

    println!("{}", report::deployment_table(&report));

    if target == (Target::Executors { record: true }) {
        let mut declarations = ExecutorDeclarations::load_or_default(&settings.executors_file)?;
        declarations.record(&network.name, report.contracts())?;
        declarations.save()?;
    }

    let incomplete = report.incomplete_verifications();
    if incomplete > 0 {
        tracing::warn!(incomplete, "Some contracts are not verified on both services");
    }

    Ok(())
}
