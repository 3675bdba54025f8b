//! Router interface encoding, role identifiers and constructor arguments.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, B256, Bytes, U256, keccak256},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Logical name of the router contract.
pub const ROUTER_CONTRACT: &str = "TychoRouter";

/// Gas allowance for each executor in a `setExecutors` batch.
pub const GAS_PER_EXECUTOR: u64 = 50_000;

/// Access-control roles held on the router, in the order they are provisioned.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    ExecutorSetterRole,
    FeeSetterRole,
    PauserRole,
    UnpauserRole,
    FundRescuerRole,
}

impl Role {
    /// The 32-byte role identifier: `keccak256` of the role name.
    pub fn id(&self) -> B256 {
        keccak256(self.to_string())
    }
}

/// A single typed constructor argument.
///
/// Written in configuration as a one-key table, e.g. `{ address = "0x1F98..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructorArg {
    Address(Address),
    Bytes32(B256),
    Uint(U256),
    Bool(bool),
}

impl From<&ConstructorArg> for DynSolValue {
    fn from(arg: &ConstructorArg) -> Self {
        match arg {
            ConstructorArg::Address(address) => DynSolValue::Address(*address),
            ConstructorArg::Bytes32(word) => DynSolValue::FixedBytes(*word, 32),
            ConstructorArg::Uint(value) => DynSolValue::Uint(*value, 256),
            ConstructorArg::Bool(value) => DynSolValue::Bool(*value),
        }
    }
}

/// ABI-encode constructor arguments as they are appended to creation code.
pub fn encode_constructor_args(args: &[ConstructorArg]) -> Bytes {
    if args.is_empty() {
        return Bytes::new();
    }
    DynSolValue::Tuple(args.iter().map(DynSolValue::from).collect())
        .abi_encode_params()
        .into()
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_call(signature: &str, params: Vec<DynSolValue>) -> Bytes {
    let mut calldata = selector(signature).to_vec();
    calldata.extend(DynSolValue::Tuple(params).abi_encode_params());
    calldata.into()
}

fn address_array(addresses: &[Address]) -> DynSolValue {
    DynSolValue::Array(addresses.iter().copied().map(DynSolValue::Address).collect())
}

/// Calls issued against a deployed router.
pub struct RouterCall;

impl RouterCall {
    /// `executors(address)`: whether `executor` is registered.
    pub fn executors(executor: Address) -> Bytes {
        encode_call("executors(address)", vec![DynSolValue::Address(executor)])
    }

    /// `setExecutors(address[])`.
    pub fn set_executors(executors: &[Address]) -> Bytes {
        encode_call("setExecutors(address[])", vec![address_array(executors)])
    }

    /// `batchGrantRole(bytes32,address[])`.
    pub fn batch_grant_role(role: Role, accounts: &[Address]) -> Bytes {
        encode_call(
            "batchGrantRole(bytes32,address[])",
            vec![DynSolValue::FixedBytes(role.id(), 32), address_array(accounts)],
        )
    }

    /// Decode the `bool` returned by `executors(address)`.
    pub fn decode_bool(data: &[u8]) -> anyhow::Result<bool> {
        DynSolType::Bool
            .abi_decode(data)
            .context("Failed to decode boolean return value")?
            .as_bool()
            .context("Return value is not a boolean")
    }
}
