//! Configuration loading.
//!
//! A flat, immutable record sourced from a JSON document named on the CLI,
//! rejecting unknown keys so a typo in the config file fails loudly instead
//! of silently.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

fn default_prefix() -> String {
    "merge-".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub github_username: String,
    pub github_token: String,

    pub github_webhook_path: String,
    pub github_webhook_secret: String,

    pub owner: String,
    pub repo: String,

    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    pub staging_branch: String,

    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub merged_run: bool,

    pub necessary_approvals: u32,
    pub sufficient_approvals: u32,

    #[serde(with = "humantime_serde")]
    pub voting_delay_min: Duration,
    #[serde(with = "humantime_serde")]
    pub voting_delay_max: Duration,

    /// Opaque pass-through to the logging collaborator; this crate treats it
    /// as an `EnvFilter` directive string (e.g. "mergebot=debug,warn").
    #[serde(default)]
    pub logger_params: Option<String>,

    /// The fixed prefix used for merge tags: `refs/tags/<prefix><prNumber>`.
    #[serde(default = "default_prefix")]
    pub merge_tag_prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file '{}'", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse configuration file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.sufficient_approvals > 1,
            "'sufficient_approvals' must be greater than 1, got {}",
            self.sufficient_approvals
        );
        anyhow::ensure!(
            self.voting_delay_max >= self.voting_delay_min,
            "'voting_delay_max' must be >= 'voting_delay_min'"
        );
        Ok(())
    }

    pub fn staging_ref(&self) -> String {
        format!("heads/{}", self.staging_branch)
    }

    pub fn merge_tag_name(&self, pr_number: u64) -> String {
        format!("{}{}", self.merge_tag_prefix, pr_number)
    }

    pub fn merge_tag_ref(&self, pr_number: u64) -> String {
        format!("tags/{}", self.merge_tag_name(pr_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "github_username": "bot",
            "github_token": "tok",
            "github_webhook_path": "/webhook",
            "github_webhook_secret": "shh",
            "owner": "acme",
            "repo": "widgets",
            "staging_branch": "staging",
            "necessary_approvals": 2,
            "sufficient_approvals": 3,
            "voting_delay_min": "1h",
            "voting_delay_max": "24h",
        })
    }

    fn write_config(value: &serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_valid_config() {
        let tmp = write_config(&base_json());
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.owner, "acme");
        assert_eq!(config.voting_delay_min, Duration::from_secs(3600));
        assert_eq!(config.port, 8080);
        assert_eq!(config.merge_tag_name(7), "merge-7");
    }

    #[test]
    fn rejects_insufficient_sufficient_approvals() {
        let mut json = base_json();
        json["sufficient_approvals"] = serde_json::json!(1);
        let tmp = write_config(&json);
        let err = Config::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("sufficient_approvals"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut json = base_json();
        json["bogus_key"] = serde_json::json!(true);
        let tmp = write_config(&json);
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn rejects_inverted_voting_window() {
        let mut json = base_json();
        json["voting_delay_min"] = serde_json::json!("24h");
        json["voting_delay_max"] = serde_json::json!("1h");
        let tmp = write_config(&json);
        assert!(Config::load(tmp.path()).is_err());
    }
}
