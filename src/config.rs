use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::store::SETUP_TREE;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },
    #[error("SEED_FUNCTION_NAME must be `local` or an http(s) URL, got {0:?}")]
    InvalidSeedTarget(String),
    #[error("TABLE_NAME {0:?} is reserved for the setup ledger")]
    ReservedTableName(String),
}

/// Where the seed routine runs when the provisioning trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedTarget {
    /// In this process, against the configured table.
    Local,
    /// The internal seed endpoint of another process.
    Remote(String),
}

impl FromStr for SeedTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            Ok(SeedTarget::Local)
        } else if s.starts_with("http://") || s.starts_with("https://") {
            Ok(SeedTarget::Remote(s.to_string()))
        } else {
            Err(ConfigError::InvalidSeedTarget(s.to_string()))
        }
    }
}

/// Runtime configuration, read from the environment (after `.env`).
///
/// Variables:
/// - `TABLE_NAME`, `DATA_DIR`
/// - `LISTEN_ADDR`, `SEED_LISTEN_ADDR`
/// - `SEED_FUNCTION_NAME`, `SEED_FIXTURE`
/// - `SEED_TIMEOUT_SECS`, `CALLBACK_TIMEOUT_SECS`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub table_name: String,
    pub data_dir: PathBuf,
    pub listen: String,
    /// Internal seed/provision listener; off when unset.
    pub seed_listen: Option<String>,
    pub seed_target: SeedTarget,
    /// Dataset YAML; the built-in v1 dataset when unset.
    pub fixture_path: Option<PathBuf>,
    pub seed_timeout: Duration,
    pub callback_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: "product-specs".to_string(),
            data_dir: PathBuf::from("data"),
            listen: "0.0.0.0:8080".to_string(),
            seed_listen: None,
            seed_target: SeedTarget::Local,
            fixture_path: None,
            seed_timeout: Duration::from_secs(300),
            callback_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TABLE_NAME") {
            if v == SETUP_TREE {
                return Err(ConfigError::ReservedTableName(v));
            }
            config.table_name = v;
        }
        if let Some(v) = var("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("LISTEN_ADDR") {
            config.listen = v;
        }
        config.seed_listen = var("SEED_LISTEN_ADDR");
        if let Some(v) = var("SEED_FUNCTION_NAME") {
            config.seed_target = v.parse()?;
        }
        config.fixture_path = var("SEED_FIXTURE").map(PathBuf::from);
        if let Some(v) = var("SEED_TIMEOUT_SECS") {
            config.seed_timeout = seconds("SEED_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("CALLBACK_TIMEOUT_SECS") {
            config.callback_timeout = seconds("CALLBACK_TIMEOUT_SECS", &v)?;
        }
        Ok(config)
    }
}

fn seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.seed_timeout, Duration::from_secs(300));
        assert_eq!(config.seed_target, SeedTarget::Local);
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            ("TABLE_NAME", "product-specs-1700000000000"),
            ("DATA_DIR", "/var/lib/products"),
            ("LISTEN_ADDR", "127.0.0.1:9090"),
            ("SEED_LISTEN_ADDR", "127.0.0.1:9091"),
            ("SEED_FUNCTION_NAME", "http://10.0.0.5:9091/seed"),
            ("SEED_FIXTURE", "fixtures/products.v2.yaml"),
            ("SEED_TIMEOUT_SECS", "60"),
            ("CALLBACK_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.table_name, "product-specs-1700000000000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/products"));
        assert_eq!(config.listen, "127.0.0.1:9090");
        assert_eq!(config.seed_listen.as_deref(), Some("127.0.0.1:9091"));
        assert_eq!(config.seed_target, SeedTarget::Remote("http://10.0.0.5:9091/seed".into()));
        assert_eq!(config.fixture_path, Some(PathBuf::from("fixtures/products.v2.yaml")));
        assert_eq!(config.seed_timeout, Duration::from_secs(60));
        assert_eq!(config.callback_timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = from_pairs(&[("TABLE_NAME", "  "), ("SEED_LISTEN_ADDR", "")]).unwrap();
        assert_eq!(config.table_name, "product-specs");
        assert_eq!(config.seed_listen, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            from_pairs(&[("SEED_TIMEOUT_SECS", "five")]),
            Err(ConfigError::InvalidSeconds { name: "SEED_TIMEOUT_SECS", .. })
        ));
        assert!(from_pairs(&[("CALLBACK_TIMEOUT_SECS", "0")]).is_err());
        assert_eq!(
            from_pairs(&[("SEED_FUNCTION_NAME", "arn:aws:lambda:seed")]),
            Err(ConfigError::InvalidSeedTarget("arn:aws:lambda:seed".into()))
        );
        assert_eq!(
            from_pairs(&[("TABLE_NAME", "__setup__")]),
            Err(ConfigError::ReservedTableName("__setup__".into()))
        );
    }

    #[test]
    fn seed_target_parsing() {
        assert_eq!("LOCAL".parse::<SeedTarget>().unwrap(), SeedTarget::Local);
        assert_eq!(
            "https://seed.internal/seed".parse::<SeedTarget>().unwrap(),
            SeedTarget::Remote("https://seed.internal/seed".into())
        );
    }
}
