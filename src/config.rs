use anyhow::{Result, bail};
use chrono::Duration;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::filter::DEFAULT_NO_ARCHIVE_TAG;
use crate::sync::{BootstrapPolicy, SyncOptions, WatermarkMode};
use crate::{metrics, pinboard, reader};

#[derive(Parser, Debug)]
#[command(name = "r2p")]
#[command(about = "Archives Reader documents to Pinboard", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Fetch and filter only; nothing is published, reported or saved.
    #[arg(long)]
    pub dry_run: bool,

    /// Human readable logs instead of JSON.
    #[arg(long)]
    pub pretty: bool,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".r2p")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize)]
pub struct Reader {
    pub token: String,
    #[serde(default = "default_reader_url")]
    pub base_url: String,
}

fn default_reader_url() -> String {
    reader::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Deserialize)]
pub struct Pinboard {
    pub auth_token: String,
    #[serde(default = "default_pinboard_url")]
    pub base_url: String,
}

fn default_pinboard_url() -> String {
    pinboard::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Deserialize)]
pub struct Metrics {
    pub webhook_url: String,
    #[serde(default = "default_metrics_field")]
    pub field: String,
}

fn default_metrics_field() -> String {
    metrics::DEFAULT_FIELD.to_string()
}

#[derive(Debug, Deserialize)]
pub struct State {
    path: String,
}

impl State {
    pub fn get_path(&self) -> PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(&self.path),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncSettings {
    pub bootstrap: BootstrapPolicy,
    #[serde(default)]
    pub watermark: WatermarkMode,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_seconds: i64,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_seconds: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_no_archive_tag")]
    pub no_archive_tag: String,
}

/// Upper bound for `safety_margin_seconds`: one year.
const MAX_SAFETY_MARGIN_SECONDS: i64 = 365 * 24 * 60 * 60;

fn default_safety_margin() -> i64 {
    0
}

fn default_publish_interval() -> u64 {
    pinboard::MIN_PUBLISH_INTERVAL.as_secs()
}

fn default_max_pages() -> u32 {
    reader::DEFAULT_MAX_PAGES
}

fn default_request_timeout() -> u64 {
    30
}

fn default_no_archive_tag() -> String {
    DEFAULT_NO_ARCHIVE_TAG.to_string()
}

impl SyncSettings {
    pub fn options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            bootstrap: self.bootstrap,
            watermark: self.watermark,
            safety_margin: Duration::seconds(self.safety_margin_seconds),
            publish_interval: std::time::Duration::from_secs(self.publish_interval_seconds),
            dry_run,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub reader: Reader,
    pub pinboard: Pinboard,
    pub metrics: Metrics,
    pub state: State,
    pub sync: SyncSettings,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str);
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("reader.token", &self.reader.token),
            ("pinboard.auth_token", &self.pinboard.auth_token),
            ("metrics.webhook_url", &self.metrics.webhook_url),
            ("state.path", &self.state.path),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }
        if self.sync.max_pages == 0 {
            bail!("sync.max_pages must be at least 1");
        }
        if !(0..=MAX_SAFETY_MARGIN_SECONDS).contains(&self.sync.safety_margin_seconds) {
            bail!(
                "sync.safety_margin_seconds must be between 0 and {}",
                MAX_SAFETY_MARGIN_SECONDS
            );
        }
        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> String {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            let Some(end) = result[actual_start..].find('}') else {
                break;
            };
            let var_name = &result[actual_start + 2..actual_start + end];

            // ${VAR:-default}
            let env_value = match var_name.split_once(":-") {
                Some((name, default)) => env::var(name).unwrap_or_else(|_| default.to_string()),
                None => env::var(var_name).unwrap_or_else(|_| {
                    tracing::warn!(variable = var_name, "environment variable not set");
                    String::new()
                }),
            };

            result.replace_range(actual_start..actual_start + end + 1, &env_value);
            offset = actual_start + env_value.len();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
reader:
  token: rt
pinboard:
  auth_token: "me:ABC"
metrics:
  webhook_url: https://hooks.test/read
state:
  path: /var/lib/r2p/last_date_fetched.txt
sync:
  bootstrap: full_history
"#;

    #[test]
    fn applies_defaults() {
        let cfg = Config::from_yaml(MINIMAL).expect("config");
        assert_eq!(cfg.reader.base_url, reader::DEFAULT_BASE_URL);
        assert_eq!(cfg.pinboard.base_url, pinboard::DEFAULT_BASE_URL);
        assert_eq!(cfg.metrics.field, "value");
        assert_eq!(cfg.sync.bootstrap, BootstrapPolicy::FullHistory);
        assert_eq!(cfg.sync.watermark, WatermarkMode::Data);
        assert_eq!(cfg.sync.max_pages, 1000);
        assert_eq!(cfg.sync.no_archive_tag, "noarchive");
        assert_eq!(
            cfg.state.get_path(),
            PathBuf::from("/var/lib/r2p/last_date_fetched.txt")
        );

        let opts = cfg.sync.options(true);
        assert!(opts.dry_run);
        assert_eq!(opts.safety_margin, Duration::zero());
        assert_eq!(opts.publish_interval, std::time::Duration::from_secs(3));
        assert_eq!(cfg.sync.request_timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn bootstrap_policy_is_required() {
        let yaml = MINIMAL.replace("  bootstrap: full_history\n", "  max_pages: 5\n");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn parses_explicit_sync_section() {
        let yaml = MINIMAL.replace(
            "  bootstrap: full_history\n",
            "  bootstrap: abort\n  watermark: wall_clock\n  max_pages: 3\n",
        );
        let cfg = Config::from_yaml(&yaml).expect("config");
        assert_eq!(cfg.sync.bootstrap, BootstrapPolicy::Abort);
        assert_eq!(cfg.sync.watermark, WatermarkMode::WallClock);
        assert_eq!(cfg.sync.max_pages, 3);
    }

    #[test]
    fn rejects_empty_secrets_and_zero_pages() {
        let yaml = MINIMAL.replace("token: rt", "token: \"\"");
        assert!(Config::from_yaml(&yaml).is_err());

        let yaml = MINIMAL.replace("  bootstrap: full_history\n", "  bootstrap: abort\n  max_pages: 0\n");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn rejects_out_of_range_safety_margin() {
        for margin in ["-1", "31536001", "9223372036854775807"] {
            let yaml = MINIMAL.replace(
                "  bootstrap: full_history\n",
                &format!("  bootstrap: full_history\n  safety_margin_seconds: {margin}\n"),
            );
            let err = Config::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("safety_margin_seconds"), "{margin}");
        }

        let yaml = MINIMAL.replace(
            "  bootstrap: full_history\n",
            "  bootstrap: full_history\n  safety_margin_seconds: 31536000\n  publish_interval_seconds: 0\n",
        );
        let opts = Config::from_yaml(&yaml).expect("config").sync.options(false);
        assert_eq!(opts.safety_margin, Duration::days(365));
        assert!(opts.publish_interval.is_zero());
    }

    #[test]
    fn substitutes_environment_with_defaults() {
        let out = Config::substitute_env_vars(
            "token: ${R2P_TEST_SURELY_UNSET_VAR:-fallback}\nother: ${R2P_TEST_SURELY_UNSET_VAR}x",
        );
        assert_eq!(out, "token: fallback\nother: x");
    }

    #[test]
    fn expands_home_in_state_path() {
        let yaml = MINIMAL.replace(
            "/var/lib/r2p/last_date_fetched.txt",
            "~/.r2p/last_date_fetched.txt",
        );
        let cfg = Config::from_yaml(&yaml).expect("config");
        assert!(cfg.state.get_path().ends_with(".r2p/last_date_fetched.txt"));
        assert!(!cfg.state.get_path().starts_with("~"));
    }
}
