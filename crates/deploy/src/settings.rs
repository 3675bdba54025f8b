//! Run settings: file locations, timings and service credentials.
//!
//! Layered from built-in defaults, an optional `Routerctl.toml` and `ROUTERCTL_`-prefixed
//! environment variables (later layers win). Nested keys use `__` in the environment, e.g.
//! `ROUTERCTL_TENDERLY__ACCESS_KEY`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_SETTLING_DELAY, TenderlyProject};

/// Default settings file, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "Routerctl.toml";

/// Prefix of the environment variables that override settings.
pub const ENV_PREFIX: &str = "ROUTERCTL_";

/// Tenderly credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderlySettings {
    pub account: String,
    pub project: String,
    pub access_key: String,
}

impl From<TenderlySettings> for TenderlyProject {
    fn from(settings: TenderlySettings) -> Self {
        Self {
            account: settings.account,
            project: settings.project,
            access_key: settings.access_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Foundry output directory.
    pub artifacts_dir: PathBuf,
    /// Executor declaration file (`{ network: { name: address } }`).
    pub executors_file: PathBuf,
    /// Role declaration file (`{ ROLE: { network: [address] } }`).
    pub roles_file: PathBuf,
    pub settling_delay_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub etherscan_api_key: Option<String>,
    pub tenderly: Option<TenderlySettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("out"),
            executors_file: PathBuf::from("config/executor_addresses.json"),
            roles_file: PathBuf::from("config/roles.json"),
            settling_delay_secs: DEFAULT_SETTLING_DELAY.as_secs(),
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            etherscan_api_key: None,
            tenderly: None,
        }
    }
}

impl Settings {
    /// Load settings from `path` (skipped when absent) and the environment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::figment(path)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(path))
    }

    pub fn settling_delay(&self) -> Duration {
        Duration::from_secs(self.settling_delay_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn tenderly_project(&self) -> Option<TenderlyProject> {
        self.tenderly.clone().map(TenderlyProject::from)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new("routerctl-test").expect("Failed to create temp dir");
        let settings: Settings = Settings::figment(&temp_dir.path().join("Routerctl.toml"))
            .extract()
            .unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.settling_delay(), DEFAULT_SETTLING_DELAY);
        assert!(settings.tenderly_project().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new("routerctl-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("Routerctl.toml");
        std::fs::write(
            &path,
            r#"
artifacts_dir = "foundry/out"
settling_delay_secs = 5
etherscan_api_key = "ABC123"

[tenderly]
account = "acme"
project = "router"
access_key = "secret"
"#,
        )
        .unwrap();

        let settings: Settings = Settings::figment(&path).extract().unwrap();

        assert_eq!(settings.artifacts_dir, PathBuf::from("foundry/out"));
        assert_eq!(settings.settling_delay(), Duration::from_secs(5));
        assert_eq!(settings.etherscan_api_key.as_deref(), Some("ABC123"));
        assert_eq!(
            settings.executors_file,
            PathBuf::from("config/executor_addresses.json")
        );
        assert_eq!(
            settings.tenderly_project(),
            Some(TenderlyProject {
                account: "acme".to_string(),
                project: "router".to_string(),
                access_key: "secret".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_file_rejected() {
        let temp_dir = TempDir::new("routerctl-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("Routerctl.toml");
        std::fs::write(&path, "settling_delay_secs = \"soon\"").unwrap();

        assert!(Settings::load(&path).is_err());
    }
}
