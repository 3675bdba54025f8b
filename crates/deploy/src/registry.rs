//! Executor registry reconciliation.
//!
//! The declaration file maps each network to the executors that should be registered on its
//! router:
//!
//! ```json
//! { "base": { "UniswapV2Executor": "0x...", "UniswapV3Executor": "0x..." } }
//! ```
//!
//! Reconciling submits a single `setExecutors` batch holding the declared executors the router does
//! not know yet, after the operator approved it.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::Context;
use futures::future::try_join_all;
use serde_json::{Map, Value};

use crate::{
    ChainClient, ConfigError, Confirm, DeployedContract, ExecutorProposal, GAS_PER_EXECUTOR,
    RouterCall, TxReceipt, TxRequest,
};

/// A declared executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorEntry {
    pub name: String,
    pub address: Address,
}

/// The executor declaration file, loaded in full.
#[derive(Debug, Clone)]
pub struct ExecutorDeclarations {
    path: PathBuf,
    networks: Map<String, Value>,
}

impl ExecutorDeclarations {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read executor declarations {}", path.display()))?;
        Self::parse(path, &content)
    }

    /// Load `path`, or start empty when it does not exist yet.
    pub fn load_or_default(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self {
                path,
                networks: Map::new(),
            })
        }
    }

    fn parse(path: PathBuf, content: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| invalid(&path, e))?;
        let Value::Object(networks) = value else {
            return Err(invalid(&path, "top level must be an object keyed by network").into());
        };
        Ok(Self { path, networks })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared executors of `network`, in file order.
    pub fn entries(&self, network: &str) -> Result<Vec<ExecutorEntry>, ConfigError> {
        let Some(declared) = self.networks.get(network) else {
            return Err(invalid(
                &self.path,
                format!("no executors declared for network {network}"),
            ));
        };
        let Value::Object(declared) = declared else {
            return Err(invalid(
                &self.path,
                format!("executors of {network} must be an object of name to address"),
            ));
        };

        declared
            .iter()
            .map(|(name, address)| {
                let address = address
                    .as_str()
                    .and_then(|a| a.parse::<Address>().ok())
                    .ok_or_else(|| {
                        invalid(&self.path, format!("{network}.{name} is not an address"))
                    })?;
                Ok(ExecutorEntry {
                    name: name.clone(),
                    address,
                })
            })
            .collect()
    }

    /// Add freshly deployed executors to `network`, replacing entries of the same name.
    ///
    /// A name deployed more than once in the same batch gets a numeric suffix. An existing entry
    /// for `network` that is not an object is left alone and reported.
    pub fn record<'c>(
        &mut self,
        network: &str,
        deployed: impl IntoIterator<Item = &'c DeployedContract>,
    ) -> Result<(), ConfigError> {
        let entry = self
            .networks
            .entry(network.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(executors) = entry else {
            return Err(invalid(
                &self.path,
                format!("executors of {network} must be an object of name to address"),
            ));
        };

        let mut seen = HashSet::new();
        for contract in deployed {
            let mut key = contract.name.clone();
            let mut occurrence = 1;
            while !seen.insert(key.clone()) {
                occurrence += 1;
                key = format!("{}_{}", contract.name, occurrence);
            }
            executors.insert(key, Value::String(contract.address.to_string()));
        }
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.networks)
            .context("Failed to serialize executor declarations")?;
        std::fs::write(&self.path, content + "\n")
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        tracing::info!(
            path = %self.path.display(),
            saved_at = %chrono::Utc::now().to_rfc3339(),
            "Executor declarations saved"
        );
        Ok(())
    }
}

fn invalid(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidDeclaration {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Declared executors split by their current registry flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub already_set: Vec<ExecutorEntry>,
    pub to_set: Vec<ExecutorEntry>,
}

impl ReconcilePlan {
    /// Gas limit of the batch: a fixed allowance per executor.
    pub fn gas_limit(&self) -> u64 {
        GAS_PER_EXECUTOR * self.to_set.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The batch was mined.
    Applied {
        receipt: TxReceipt,
        executors: Vec<ExecutorEntry>,
    },
    /// Every declared executor was already registered.
    NoOp,
    /// The operator refused; nothing was submitted.
    Declined,
}

/// Brings the router's executor registry in line with the declaration file.
pub struct ExecutorReconciler<'a, C> {
    chain: &'a C,
    router: Address,
    declarations: &'a ExecutorDeclarations,
}

impl<'a, C: ChainClient> ExecutorReconciler<'a, C> {
    pub fn new(chain: &'a C, router: Address, declarations: &'a ExecutorDeclarations) -> Self {
        Self {
            chain,
            router,
            declarations,
        }
    }

    /// Query the registry flag of every declared executor of `network`.
    pub async fn plan(&self, network: &str) -> anyhow::Result<ReconcilePlan> {
        let mut seen = HashSet::new();
        let declared: Vec<ExecutorEntry> = self
            .declarations
            .entries(network)?
            .into_iter()
            .filter(|entry| seen.insert(entry.address))
            .collect();

        let flags = try_join_all(declared.iter().map(|entry| async move {
            let data = self
                .chain
                .call(self.router, RouterCall::executors(entry.address))
                .await?;
            RouterCall::decode_bool(&data)
                .with_context(|| format!("Bad executors() result for {}", entry.name))
        }))
        .await
        .context("Failed to query executor registry")?;

        let mut plan = ReconcilePlan::default();
        for (entry, is_set) in declared.into_iter().zip(flags) {
            tracing::debug!(executor = %entry.name, address = %entry.address, is_set, "Executor flag");
            if is_set {
                plan.already_set.push(entry);
            } else {
                plan.to_set.push(entry);
            }
        }
        Ok(plan)
    }

    /// Register the missing executors of `network` in one transaction, if `confirm` approves.
    pub async fn reconcile(
        &self,
        network: &str,
        confirm: &mut impl Confirm,
    ) -> anyhow::Result<ReconcileOutcome> {
        let plan = self.plan(network).await?;

        for entry in &plan.already_set {
            tracing::info!(executor = %entry.name, address = %entry.address, "Executor already set");
        }

        if plan.to_set.is_empty() {
            tracing::info!(network, "All executors are already set, nothing to do");
            return Ok(ReconcileOutcome::NoOp);
        }

        let proposal = ExecutorProposal {
            network,
            executors: &plan.to_set,
            already_set: &plan.already_set,
        };
        if !confirm.confirm(&proposal)? {
            tracing::warn!(network, "Operation cancelled by operator");
            return Ok(ReconcileOutcome::Declined);
        }

        let addresses: Vec<Address> = plan.to_set.iter().map(|e| e.address).collect();
        let tx = TxRequest::call(self.router, RouterCall::set_executors(&addresses))
            .with_gas(plan.gas_limit());

        tracing::info!(
            network,
            router = %self.router,
            count = addresses.len(),
            gas = plan.gas_limit(),
            "Setting executors..."
        );

        let receipt = self.chain.submit(tx).await?;
        if !receipt.status {
            anyhow::bail!("setExecutors transaction {} reverted", receipt.transaction_hash);
        }

        tracing::info!(tx_hash = %receipt.transaction_hash, "Executors set");

        Ok(ReconcileOutcome::Applied {
            receipt,
            executors: plan.to_set,
        })
    }
}
