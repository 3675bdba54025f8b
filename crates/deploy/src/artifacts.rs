//! Compiled contract artifacts.
//!
//! The orchestrator never compiles anything: it reads what `forge build` left in the output
//! directory.

use std::path::PathBuf;

use alloy_core::primitives::Bytes;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use crate::{ConstructorArg, contracts::encode_constructor_args};

/// What a verification service needs to reproduce a build.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationInput {
    /// `<source path>:<contract name>`.
    pub contract_identifier: String,
    /// Full compiler version, `v`-prefixed (e.g. `v0.8.26+commit.8a97fa7a`).
    pub compiler_version: String,
    /// Solidity standard-JSON input used for the build.
    pub standard_json_input: Value,
}

/// Provides creation code and build metadata by logical contract name.
pub trait ContractFactory {
    /// Creation bytecode with the ABI-encoded constructor arguments appended.
    fn creation_code(&self, contract: &str, args: &[ConstructorArg]) -> anyhow::Result<Bytes>;

    /// Build metadata for source verification.
    fn verification_input(&self, contract: &str) -> anyhow::Result<VerificationInput>;
}

#[derive(Debug, Deserialize)]
struct Artifact {
    bytecode: ArtifactBytecode,
    metadata: ArtifactMetadata,
}

#[derive(Debug, Deserialize)]
struct ArtifactBytecode {
    object: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactMetadata {
    compiler: CompilerInfo,
    settings: MetadataSettings,
}

#[derive(Debug, Deserialize)]
struct CompilerInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSettings {
    compilation_target: serde_json::Map<String, Value>,
}

/// [`ContractFactory`] over a Foundry output directory (`out/`).
#[derive(Debug, Clone)]
pub struct FoundryArtifacts {
    out_dir: PathBuf,
}

impl FoundryArtifacts {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Locate `<Name>.sol/<Name>.json`, falling back to any `*/<Name>.json`.
    fn artifact_path(&self, contract: &str) -> anyhow::Result<PathBuf> {
        let file_name = format!("{contract}.json");
        let direct = self.out_dir.join(format!("{contract}.sol")).join(&file_name);
        if direct.is_file() {
            return Ok(direct);
        }

        let entries = std::fs::read_dir(&self.out_dir).with_context(|| {
            format!(
                "Failed to read artifact directory {}. Did you run `forge build`?",
                self.out_dir.display()
            )
        })?;

        for entry in entries {
            let candidate = entry?.path().join(&file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        anyhow::bail!(
            "No artifact for contract {} in {}",
            contract,
            self.out_dir.display()
        )
    }

    fn load_artifact(&self, contract: &str) -> anyhow::Result<Artifact> {
        let path = self.artifact_path(contract)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))
    }

    /// Find the build-info standard-JSON input that compiled `source_path`.
    fn standard_json_input(&self, source_path: &str) -> anyhow::Result<Value> {
        let build_info_dir = self.out_dir.join("build-info");
        let entries = std::fs::read_dir(&build_info_dir)
            .with_context(|| format!("Failed to read {}", build_info_dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut build_info: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;

            if build_info["input"]["sources"].get(source_path).is_some() {
                tracing::debug!(path = %path.display(), source_path, "Found build info");
                return Ok(build_info["input"].take());
            }
        }

        anyhow::bail!(
            "No build info in {} contains {}",
            build_info_dir.display(),
            source_path
        )
    }
}

fn decode_bytecode(contract: &str, object: &str) -> anyhow::Result<Vec<u8>> {
    if object.contains("__$") {
        anyhow::bail!("Bytecode of {} has unlinked library references", contract);
    }

    let code = hex::decode(object.trim_start_matches("0x"))
        .with_context(|| format!("Bytecode of {} is not valid hex", contract))?;
    if code.is_empty() {
        anyhow::bail!("{} has no creation code (abstract contract or interface?)", contract);
    }
    Ok(code)
}

impl ContractFactory for FoundryArtifacts {
    fn creation_code(&self, contract: &str, args: &[ConstructorArg]) -> anyhow::Result<Bytes> {
        let artifact = self.load_artifact(contract)?;
        let mut code = decode_bytecode(contract, &artifact.bytecode.object)?;
        code.extend_from_slice(&encode_constructor_args(args));
        Ok(code.into())
    }

    fn verification_input(&self, contract: &str) -> anyhow::Result<VerificationInput> {
        let artifact = self.load_artifact(contract)?;

        let source_path = artifact
            .metadata
            .settings
            .compilation_target
            .iter()
            .find(|(_, name)| name.as_str() == Some(contract))
            .map(|(path, _)| path.clone())
            .with_context(|| format!("Compilation target of {} not found in metadata", contract))?;

        let standard_json_input = self.standard_json_input(&source_path)?;

        Ok(VerificationInput {
            contract_identifier: format!("{source_path}:{contract}"),
            compiler_version: format!("v{}", artifact.metadata.compiler.version),
            standard_json_input,
        })
    }
}

/// Write a minimal artifact layout for tests.
#[cfg(test)]
pub(crate) fn write_test_artifact(out_dir: &std::path::Path, contract: &str, bytecode: &str) {
    let dir = out_dir.join(format!("{contract}.sol"));
    std::fs::create_dir_all(&dir).unwrap();
    let source_path = format!("src/{contract}.sol");
    std::fs::write(
        dir.join(format!("{contract}.json")),
        serde_json::json!({
            "abi": [],
            "bytecode": { "object": bytecode },
            "metadata": {
                "compiler": { "version": "0.8.26+commit.8a97fa7a" },
                "settings": { "compilationTarget": { source_path.clone(): contract } }
            }
        })
        .to_string(),
    )
    .unwrap();

    let build_info = out_dir.join("build-info");
    std::fs::create_dir_all(&build_info).unwrap();
    std::fs::write(
        build_info.join(format!("{contract}.json")),
        serde_json::json!({
            "input": {
                "language": "Solidity",
                "sources": { source_path: { "content": "contract X {}" } },
                "settings": { "optimizer": { "enabled": true, "runs": 200 } }
            }
        })
        .to_string(),
    )
    .unwrap();
}
