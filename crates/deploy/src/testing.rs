//! In-memory doubles of the external collaborators.
//!
//! [`MockChain`] behaves like a router deployment on a chain that mines every transaction
//! instantly: it tracks executor flags and role members, and records every call it receives.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Mutex,
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, B256, Bytes, TxHash, U256, keccak256},
};

use crate::{
    ChainClient, Confirm, ConfirmationTimeout, ConstructorArg, ContractFactory, ExecutorProposal,
    Role, RouterCall, SourceVerifier, StageOutcome, TxReceipt, TxRequest, VerificationInput,
    VerificationRequest, VerificationService, contracts::encode_constructor_args,
};

#[derive(Default)]
struct ChainState {
    nonce: u64,
    executors: HashSet<Address>,
    roles: HashMap<B256, BTreeSet<Address>>,
    sent: Vec<TxRequest>,
    receipts: HashMap<TxHash, TxReceipt>,
    deployments: Vec<Address>,
    executor_batches: Vec<Vec<Address>>,
    role_grants: Vec<(Role, Vec<Address>)>,
    flag_queries: usize,
    reject_next: Option<String>,
    revert_next: bool,
    stall_next: bool,
    rejected_roles: HashSet<Role>,
}

/// In-memory chain hosting a single router.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    /// Chain whose router already has `executors` registered.
    pub fn with_executors(executors: impl IntoIterator<Item = Address>) -> Self {
        let chain = Self::default();
        chain.lock().executors.extend(executors);
        chain
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain state poisoned")
    }

    /// Reject the next submitted transaction with `reason`.
    pub fn reject_next(&self, reason: &str) {
        self.lock().reject_next = Some(reason.to_string());
    }

    /// Mine the next submitted transaction with a failed status.
    pub fn revert_next(&self) {
        self.lock().revert_next = true;
    }

    /// Never mine the next submitted transaction.
    pub fn stall_next(&self) {
        self.lock().stall_next = true;
    }

    /// Reject every grant of `role`.
    pub fn reject_role(&self, role: Role) {
        self.lock().rejected_roles.insert(role);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.lock().sent.clone()
    }

    /// Addresses of contracts created so far, in order.
    pub fn deployments(&self) -> Vec<Address> {
        self.lock().deployments.clone()
    }

    /// Address lists of every `setExecutors` transaction.
    pub fn executor_batches(&self) -> Vec<Vec<Address>> {
        self.lock().executor_batches.clone()
    }

    /// Every `batchGrantRole` transaction.
    pub fn role_grants(&self) -> Vec<(Role, Vec<Address>)> {
        self.lock().role_grants.clone()
    }

    pub fn flag_queries(&self) -> usize {
        self.lock().flag_queries
    }

    pub fn is_executor(&self, executor: Address) -> bool {
        self.lock().executors.contains(&executor)
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.lock()
            .roles
            .get(&role.id())
            .is_some_and(|members| members.contains(&account))
    }
}

fn decode_params(types: Vec<DynSolType>, calldata: &[u8]) -> anyhow::Result<Vec<DynSolValue>> {
    let decoded = DynSolType::Tuple(types).abi_decode_params(&calldata[4..])?;
    decoded
        .as_tuple()
        .map(<[DynSolValue]>::to_vec)
        .ok_or_else(|| anyhow::anyhow!("expected tuple"))
}

fn addresses(value: &DynSolValue) -> Vec<Address> {
    value
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(DynSolValue::as_address)
        .collect()
}

fn address_array_type() -> DynSolType {
    DynSolType::Array(Box::new(DynSolType::Address))
}

fn has_selector(calldata: &[u8], reference: &Bytes) -> bool {
    calldata.len() >= 4 && calldata[..4] == reference[..4]
}

impl ChainClient for MockChain {
    async fn signer(&self) -> anyhow::Result<Address> {
        Ok(Address::with_last_byte(0xde))
    }

    async fn balance(&self, _account: Address) -> anyhow::Result<U256> {
        Ok(U256::from(10u128.pow(19)))
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        if !has_selector(&data, &RouterCall::executors(Address::ZERO)) {
            anyhow::bail!("unexpected call to {}", to);
        }

        let params = decode_params(vec![DynSolType::Address], &data)?;
        let executor = params[0]
            .as_address()
            .ok_or_else(|| anyhow::anyhow!("expected address"))?;

        let mut state = self.lock();
        state.flag_queries += 1;
        let flag = state.executors.contains(&executor);
        Ok(DynSolValue::Bool(flag).abi_encode().into())
    }

    async fn send_transaction(&self, tx: TxRequest) -> anyhow::Result<TxHash> {
        let mut state = self.lock();

        if let Some(reason) = state.reject_next.take() {
            anyhow::bail!("RPC error: {}", reason);
        }

        let status = !std::mem::take(&mut state.revert_next);
        let mut contract_address = None;

        match tx.to {
            None => {
                let address = Address::from_slice(&keccak256(state.nonce.to_be_bytes())[12..]);
                if status {
                    state.deployments.push(address);
                    contract_address = Some(address);
                }
            }
            Some(_) if has_selector(&tx.data, &RouterCall::set_executors(&[])) => {
                let params = decode_params(vec![address_array_type()], &tx.data)?;
                let batch = addresses(&params[0]);
                state.executor_batches.push(batch.clone());
                if status {
                    state.executors.extend(batch);
                }
            }
            Some(_) if has_selector(&tx.data, &RouterCall::batch_grant_role(Role::PauserRole, &[])) => {
                let params = decode_params(
                    vec![DynSolType::FixedBytes(32), address_array_type()],
                    &tx.data,
                )?;
                let role_id = params[0]
                    .as_fixed_bytes()
                    .map(|(bytes, _)| B256::from_slice(bytes))
                    .ok_or_else(|| anyhow::anyhow!("expected role id"))?;
                let role = <Role as strum::IntoEnumIterator>::iter()
                    .find(|role| role.id() == role_id)
                    .ok_or_else(|| anyhow::anyhow!("unknown role {}", role_id))?;

                if state.rejected_roles.contains(&role) {
                    anyhow::bail!("RPC error: execution reverted: AccessControl");
                }

                let accounts = addresses(&params[1]);
                state.role_grants.push((role, accounts.clone()));
                if status {
                    state.roles.entry(role_id).or_default().extend(accounts);
                }
            }
            Some(to) => anyhow::bail!("unexpected transaction to {}", to),
        }

        state.nonce += 1;
        let tx_hash = keccak256(format!("tx-{}", state.nonce));
        state.sent.push(tx.clone());
        if std::mem::take(&mut state.stall_next) {
            return Ok(tx_hash);
        }
        let block_number = state.nonce;
        state.receipts.insert(
            tx_hash,
            TxReceipt {
                transaction_hash: tx_hash,
                block_number,
                status,
                contract_address,
                gas_used: 21_000,
            },
        );

        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> anyhow::Result<TxReceipt> {
        self.lock()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ConfirmationTimeout { tx_hash }.into())
    }
}

/// [`ContractFactory`] whose creation code is the contract name followed by the encoded arguments.
#[derive(Default)]
pub struct MockFactory {
    missing: HashSet<String>,
}

impl MockFactory {
    /// Behave as if `contract` was never compiled.
    pub fn without(mut self, contract: &str) -> Self {
        self.missing.insert(contract.to_string());
        self
    }

    fn check(&self, contract: &str) -> anyhow::Result<()> {
        if self.missing.contains(contract) {
            anyhow::bail!("No artifact for contract {}", contract);
        }
        Ok(())
    }
}

impl ContractFactory for MockFactory {
    fn creation_code(&self, contract: &str, args: &[ConstructorArg]) -> anyhow::Result<Bytes> {
        self.check(contract)?;
        let mut code = contract.as_bytes().to_vec();
        code.extend_from_slice(&encode_constructor_args(args));
        Ok(code.into())
    }

    fn verification_input(&self, contract: &str) -> anyhow::Result<VerificationInput> {
        self.check(contract)?;
        Ok(VerificationInput {
            contract_identifier: format!("src/{contract}.sol:{contract}"),
            compiler_version: "v0.8.26+commit.8a97fa7a".to_string(),
            standard_json_input: serde_json::json!({ "language": "Solidity" }),
        })
    }
}

/// [`SourceVerifier`] that records every attempt.
pub struct MockVerifier {
    service: VerificationService,
    failing: HashSet<String>,
    skip_reason: Option<String>,
    attempts: Mutex<Vec<(String, tokio::time::Instant)>>,
}

impl MockVerifier {
    pub fn new(service: VerificationService) -> Self {
        Self {
            service,
            failing: HashSet::new(),
            skip_reason: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fail verification of `contract`.
    pub fn failing(mut self, contract: &str) -> Self {
        self.failing.insert(contract.to_string());
        self
    }

    /// Never attempt verification.
    pub fn skipping(mut self, reason: &str) -> Self {
        self.skip_reason = Some(reason.to_string());
        self
    }

    /// Names of the contracts verification was attempted for, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .expect("mock verifier poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempts
            .lock()
            .expect("mock verifier poisoned")
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

impl SourceVerifier for MockVerifier {
    fn service(&self) -> VerificationService {
        self.service
    }

    fn skip_reason(&self) -> Option<String> {
        self.skip_reason.clone()
    }

    async fn verify(&self, request: VerificationRequest<'_>) -> StageOutcome {
        let name = request.contract.name.clone();
        self.attempts
            .lock()
            .expect("mock verifier poisoned")
            .push((name.clone(), tokio::time::Instant::now()));

        if self.failing.contains(&name) {
            StageOutcome::Failed(format!("{} rejected {}", self.service, name))
        } else {
            StageOutcome::Verified
        }
    }
}

/// [`Confirm`] with a fixed answer that counts how often it was asked.
pub struct ScriptedConfirm {
    answer: bool,
    pub proposals: Vec<Vec<Address>>,
}

impl ScriptedConfirm {
    pub fn approve() -> Self {
        Self {
            answer: true,
            proposals: Vec::new(),
        }
    }

    pub fn decline() -> Self {
        Self {
            answer: false,
            proposals: Vec::new(),
        }
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, proposal: &ExecutorProposal<'_>) -> anyhow::Result<bool> {
        self.proposals
            .push(proposal.executors.iter().map(|e| e.address).collect());
        Ok(self.answer)
    }
}
