//! Per-network deployment parameters.
//!
//! The table is parsed once from a declarative TOML document and handed to every component that
//! needs it. Nothing outside this module knows which address belongs to which chain.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConstructorArg};

/// The network table shipped with the crate.
const BUILTIN_NETWORKS: &str = include_str!("../networks.toml");

/// Whether a network is a real chain or a pre-production fork of one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkKind {
    Production,
    Simulation,
}

/// An executor contract to deploy, with its constructor arguments in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

/// Deployment parameters for a single network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// The network identifier this entry is keyed by.
    #[serde(skip)]
    pub name: String,
    pub chain_id: u64,
    pub kind: NetworkKind,
    /// Permit2 deployment used by the router.
    pub permit2: Address,
    /// Wrapped native asset of the chain.
    pub weth: Address,
    /// Executors deployed on this network, in deployment order.
    #[serde(default)]
    pub executors: Vec<ExecutorSpec>,
}

impl NetworkConfig {
    /// Constructor arguments of the router: `(permit2, weth)`.
    pub fn router_args(&self) -> Vec<ConstructorArg> {
        vec![
            ConstructorArg::Address(self.permit2),
            ConstructorArg::Address(self.weth),
        ]
    }

    pub fn is_simulation(&self) -> bool {
        self.kind == NetworkKind::Simulation
    }
}

#[derive(Deserialize)]
struct NetworkFile {
    networks: BTreeMap<String, NetworkConfig>,
}

/// Immutable lookup from network identifier to [`NetworkConfig`].
#[derive(Debug, Clone)]
pub struct NetworkTable {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkTable {
    /// The table embedded in the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_NETWORKS).context("Failed to parse built-in network table")
    }

    /// Parse a table from TOML.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: NetworkFile = toml::from_str(content).context("Failed to parse network table")?;
        let networks = file
            .networks
            .into_iter()
            .map(|(name, mut config)| {
                config.name = name.clone();
                (name, config)
            })
            .collect();
        Ok(Self { networks })
    }

    /// Load a table from a TOML file, replacing the built-in one.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read network table from {}", path.display()))?;
        let table = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), networks = table.networks.len(), "Network table loaded");
        Ok(table)
    }

    /// Look up a network. Unknown identifiers are an error, never a default.
    pub fn resolve(&self, network: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(network)
            .ok_or_else(|| ConfigError::UnsupportedNetwork(network.to_string()))
    }

    /// Identifiers of every supported network.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}
