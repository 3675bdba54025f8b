//! Role grant provisioning.
//!
//! The role declaration file maps role names to per-network account lists:
//!
//! ```json
//! { "PAUSER_ROLE": { "base": ["0x..."] }, "FEE_SETTER_ROLE": { "base": [] } }
//! ```
//!
//! Each role with a non-empty list for the target network is granted in one `batchGrantRole`
//! transaction. Roles are independent: a failed grant is reported and the next role proceeds.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::Context;
use strum::IntoEnumIterator;

use crate::{ChainClient, ConfigError, Role, RouterCall, TxReceipt, TxRequest};

/// The role declaration file, loaded in full.
#[derive(Debug, Clone, Default)]
pub struct RoleDeclarations {
    roles: BTreeMap<Role, BTreeMap<String, Vec<Address>>>,
}

impl RoleDeclarations {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read role declarations {}", path.display()))?;
        Ok(Self::parse(path, &content)?)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<Address>>> = serde_json::from_str(content)
            .map_err(|e| ConfigError::InvalidDeclaration {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut roles = BTreeMap::new();
        for (name, networks) in raw {
            match name.parse::<Role>() {
                Ok(role) => {
                    roles.insert(role, networks);
                }
                Err(_) => tracing::warn!(role = %name, "Ignoring unknown role"),
            }
        }
        Ok(Self { roles })
    }

    /// Accounts to receive `role` on `network`, deduplicated in declaration order.
    pub fn accounts(&self, role: Role, network: &str) -> Vec<Address> {
        let mut seen = HashSet::new();
        self.roles
            .get(&role)
            .and_then(|networks| networks.get(network))
            .map(|accounts| {
                accounts
                    .iter()
                    .copied()
                    .filter(|account| seen.insert(*account))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Result of provisioning one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleOutcome {
    Granted(TxReceipt),
    /// No accounts declared for this role on the network.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: Role,
    pub accounts: Vec<Address>,
    pub outcome: RoleOutcome,
}

/// Per-role results of a provisioning run, in provisioning order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub network: String,
    pub grants: Vec<RoleGrant>,
}

impl ProvisionReport {
    /// Receipts of the successful grants.
    pub fn receipts(&self) -> impl Iterator<Item = &TxReceipt> {
        self.grants.iter().filter_map(|grant| match &grant.outcome {
            RoleOutcome::Granted(receipt) => Some(receipt),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &RoleGrant> {
        self.grants
            .iter()
            .filter(|grant| matches!(grant.outcome, RoleOutcome::Failed(_)))
    }
}

/// Grants the declared roles on the router.
pub struct RoleProvisioner<'a, C> {
    chain: &'a C,
    router: Address,
    declarations: &'a RoleDeclarations,
}

impl<'a, C: ChainClient> RoleProvisioner<'a, C> {
    pub fn new(chain: &'a C, router: Address, declarations: &'a RoleDeclarations) -> Self {
        Self {
            chain,
            router,
            declarations,
        }
    }

    /// Grant every role in [`Role`] order. Never fails as a whole.
    pub async fn provision(&self, network: &str) -> ProvisionReport {
        let mut grants = Vec::new();

        for role in Role::iter() {
            let accounts = self.declarations.accounts(role, network);
            let outcome = if accounts.is_empty() {
                tracing::info!(%role, network, "No accounts declared, skipping role");
                RoleOutcome::Skipped
            } else {
                self.grant(role, &accounts).await
            };
            grants.push(RoleGrant {
                role,
                accounts,
                outcome,
            });
        }

        ProvisionReport {
            network: network.to_string(),
            grants,
        }
    }

    async fn grant(&self, role: Role, accounts: &[Address]) -> RoleOutcome {
        tracing::info!(%role, role_id = %role.id(), count = accounts.len(), "Granting role...");

        let tx = TxRequest::call(self.router, RouterCall::batch_grant_role(role, accounts));
        match self.chain.submit(tx).await {
            Ok(receipt) if receipt.status => {
                tracing::info!(%role, tx_hash = %receipt.transaction_hash, "Role granted");
                RoleOutcome::Granted(receipt)
            }
            Ok(receipt) => {
                let reason = format!("transaction {} reverted", receipt.transaction_hash);
                tracing::error!(%role, %reason, "Role grant failed");
                RoleOutcome::Failed(reason)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::error!(%role, %reason, "Role grant failed");
                RoleOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    const ROUTER: Address = Address::repeat_byte(0x77);

    fn account(last_byte: u8) -> Address {
        Address::with_last_byte(last_byte)
    }

    fn declarations(json: serde_json::Value) -> RoleDeclarations {
        RoleDeclarations::parse(Path::new("roles.json"), &json.to_string()).unwrap()
    }

    #[test]
    fn test_unknown_roles_ignored() {
        let declarations = declarations(serde_json::json!({
            "PAUSER_ROLE": { "base": [account(1).to_string()] },
            "MINTER_ROLE": { "base": [account(2).to_string()] },
        }));

        assert_eq!(declarations.accounts(Role::PauserRole, "base"), vec![account(1)]);
        assert_eq!(declarations.roles.len(), 1);
    }

    #[test]
    fn test_malformed_declarations() {
        let result = RoleDeclarations::parse(
            Path::new("roles.json"),
            r#"{ "PAUSER_ROLE": { "base": ["0x1234"] } }"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidDeclaration { .. })));
    }

    #[tokio::test]
    async fn test_one_batch_per_non_empty_role() {
        let chain = MockChain::default();
        let declarations = declarations(serde_json::json!({
            "PAUSER_ROLE": { "base": [account(1).to_string(), account(2).to_string()] },
            "FEE_SETTER_ROLE": { "base": [] },
        }));

        let report = RoleProvisioner::new(&chain, ROUTER, &declarations)
            .provision("base")
            .await;

        assert_eq!(
            chain.role_grants(),
            vec![(Role::PauserRole, vec![account(1), account(2)])]
        );
        assert_eq!(report.receipts().count(), 1);
        assert!(chain.has_role(Role::PauserRole, account(2)));

        let fee_setter = report
            .grants
            .iter()
            .find(|grant| grant.role == Role::FeeSetterRole)
            .unwrap();
        assert_eq!(fee_setter.outcome, RoleOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_roles_granted_in_fixed_order() {
        let chain = MockChain::default();
        let declarations = declarations(serde_json::json!({
            "UNPAUSER_ROLE": { "base": [account(3).to_string()] },
            "EXECUTOR_SETTER_ROLE": { "base": [account(1).to_string()] },
            "PAUSER_ROLE": { "base": [account(2).to_string()] },
        }));

        RoleProvisioner::new(&chain, ROUTER, &declarations)
            .provision("base")
            .await;

        let roles: Vec<Role> = chain.role_grants().into_iter().map(|(role, _)| role).collect();
        assert_eq!(
            roles,
            vec![Role::ExecutorSetterRole, Role::PauserRole, Role::UnpauserRole]
        );
    }

    #[tokio::test]
    async fn test_failed_role_does_not_stop_others() {
        let chain = MockChain::default();
        chain.reject_role(Role::FeeSetterRole);
        let declarations = declarations(serde_json::json!({
            "FEE_SETTER_ROLE": { "base": [account(1).to_string()] },
            "PAUSER_ROLE": { "base": [account(2).to_string()] },
        }));

        let report = RoleProvisioner::new(&chain, ROUTER, &declarations)
            .provision("base")
            .await;

        let failures: Vec<Role> = report.failures().map(|grant| grant.role).collect();
        assert_eq!(failures, vec![Role::FeeSetterRole]);
        assert!(chain.has_role(Role::PauserRole, account(2)));
        assert_eq!(report.receipts().count(), 1);
    }

    #[tokio::test]
    async fn test_other_networks_untouched() {
        let chain = MockChain::default();
        let declarations = declarations(serde_json::json!({
            "PAUSER_ROLE": { "ethereum": [account(1).to_string()] },
        }));

        let report = RoleProvisioner::new(&chain, ROUTER, &declarations)
            .provision("base")
            .await;

        assert!(chain.sent().is_empty());
        assert!(report
            .grants
            .iter()
            .all(|grant| grant.outcome == RoleOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_duplicate_accounts_granted_once() {
        let chain = MockChain::default();
        let declarations = declarations(serde_json::json!({
            "PAUSER_ROLE": { "base": [account(1).to_string(), account(1).to_string()] },
        }));

        RoleProvisioner::new(&chain, ROUTER, &declarations)
            .provision("base")
            .await;

        assert_eq!(
            chain.role_grants(),
            vec![(Role::PauserRole, vec![account(1)])]
        );
    }
}
