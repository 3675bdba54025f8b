//! Terminal summaries of finished runs.

use comfy_table::Table;
use routerctl_deploy::{DeploymentReport, ProvisionReport, ReconcileOutcome, RoleOutcome};

pub fn deployment_table(report: &DeploymentReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Contract", "Address", "Simulator", "Explorer", "Status"]);
    for record in &report.records {
        table.add_row(vec![
            record.contract.name.clone(),
            record.contract.address.to_string(),
            record.verification.simulator.to_string(),
            record.verification.explorer.to_string(),
            record.verification.status().to_string(),
        ]);
    }
    table
}

pub fn provision_table(report: &ProvisionReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Role", "Accounts", "Outcome"]);
    for grant in &report.grants {
        let outcome = match &grant.outcome {
            RoleOutcome::Granted(receipt) => format!("granted in {}", receipt.transaction_hash),
            RoleOutcome::Skipped => "skipped".to_string(),
            RoleOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        table.add_row(vec![grant.role.to_string(), grant.accounts.len().to_string(), outcome]);
    }
    table
}

pub fn reconcile_summary(network: &str, outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Applied { receipt, executors } => format!(
            "Set {} executors on {} in {}",
            executors.len(),
            network,
            receipt.transaction_hash
        ),
        ReconcileOutcome::NoOp => format!("All executors are already set on {network}"),
        ReconcileOutcome::Declined => "Operation cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, TxHash};
    use routerctl_deploy::{
        ContractVerification, DeployedContract, DeploymentRecord, Role, RoleGrant, StageOutcome,
    };

    use super::*;

    #[test]
    fn test_deployment_table_lists_every_contract() {
        let report = DeploymentReport {
            network: "base".to_string(),
            records: vec![DeploymentRecord {
                contract: DeployedContract {
                    name: "UniswapV2Executor".to_string(),
                    address: Address::with_last_byte(1),
                    constructor_args: vec![],
                    tx_hash: TxHash::ZERO,
                },
                verification: ContractVerification {
                    contract: "UniswapV2Executor".to_string(),
                    address: Address::with_last_byte(1),
                    simulator: StageOutcome::Failed("timeout".to_string()),
                    explorer: StageOutcome::Verified,
                },
            }],
        };

        let rendered = deployment_table(&report).to_string();
        assert!(rendered.contains("UniswapV2Executor"));
        assert!(rendered.contains("partially-verified"));
    }

    #[test]
    fn test_provision_table_shows_failures() {
        let report = ProvisionReport {
            network: "base".to_string(),
            grants: vec![RoleGrant {
                role: Role::PauserRole,
                accounts: vec![Address::with_last_byte(1)],
                outcome: RoleOutcome::Failed("reverted".to_string()),
            }],
        };

        let rendered = provision_table(&report).to_string();
        assert!(rendered.contains("PAUSER_ROLE"));
        assert!(rendered.contains("failed: reverted"));
    }
}
