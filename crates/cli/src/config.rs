//! Quickstart configuration: TOML file plus command-line overrides.
//!
//! ```toml
//! ledger_name = "MyLedger"
//! table_name = "MyTable"
//! table_settle_delay = "5s"
//!
//! [provisioning]
//! poll_interval = "15s"
//! timeout = "10m"
//!
//! [retry]
//! retry_limit = 3
//!
//! [service]
//! activation_polls = 2
//! ```

use std::{path::Path, time::Duration};

use anyhow::Context;
use quickstart_driver::{DriverConfig, PoolConfig, ProvisioningConfig, RetryConfig};
use quickstart_ledger::{LedgerName, MemoryLedgerConfig};
use serde::{Deserialize, Serialize};

/// Default wait between creating the table and inserting into it (5 seconds).
const DEFAULT_TABLE_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Settings for one quickstart run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickstartConfig {
    /// Ledger to provision.
    #[serde(default = "default_ledger_name")]
    pub ledger_name: String,

    /// Table to create, insert into and query.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Field of the inserted document holding the insertion time.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Wait after a successful create-table stage.
    #[serde(with = "humantime_serde", default = "default_table_settle_delay")]
    pub table_settle_delay: Duration,

    /// Provisioning wait settings.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Session pool limits.
    #[serde(default)]
    pub pool: PoolConfig,

    /// OCC retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// In-memory ledger service settings.
    #[serde(default)]
    pub service: MemoryLedgerConfig,
}

fn default_ledger_name() -> String {
    "MyLedger".to_owned()
}

fn default_table_name() -> String {
    "MyTable".to_owned()
}

fn default_timestamp_field() -> String {
    "mytabledate".to_owned()
}

fn default_table_settle_delay() -> Duration {
    DEFAULT_TABLE_SETTLE_DELAY
}

impl Default for QuickstartConfig {
    fn default() -> Self {
        Self {
            ledger_name: default_ledger_name(),
            table_name: default_table_name(),
            timestamp_field: default_timestamp_field(),
            table_settle_delay: DEFAULT_TABLE_SETTLE_DELAY,
            provisioning: ProvisioningConfig::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            service: MemoryLedgerConfig::default(),
        }
    }
}

/// Values given on the command line. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Ledger name.
    pub ledger_name: Option<String>,
    /// Table name.
    pub table_name: Option<String>,
    /// Provisioning poll interval.
    pub poll_interval: Option<Duration>,
    /// Describe calls before the in-memory ledger turns active.
    pub activation_polls: Option<u32>,
}

impl QuickstartConfig {
    /// Loads the configuration from `path`, or returns the defaults when no
    /// path is given.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid TOML for this schema,
    /// or holds invalid values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            },
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the loaded values.
    ///
    /// # Errors
    ///
    /// Fails if an overridden value is invalid.
    pub fn with_overrides(mut self, overrides: Overrides) -> anyhow::Result<Self> {
        if let Some(ledger_name) = overrides.ledger_name {
            self.ledger_name = ledger_name;
        }
        if let Some(table_name) = overrides.table_name {
            self.table_name = table_name;
        }
        if let Some(poll_interval) = overrides.poll_interval {
            self.provisioning = self.provisioning.with_poll_interval(poll_interval)?;
        }
        if let Some(activation_polls) = overrides.activation_polls {
            self.service.activation_polls = activation_polls;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> anyhow::Result<()> {
        LedgerName::new(self.ledger_name.as_str()).context("invalid ledger_name")?;
        if self.timestamp_field.is_empty() {
            anyhow::bail!("timestamp_field must not be empty");
        }
        self.provisioning.validate()?;
        self.pool.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Returns the validated ledger name.
    ///
    /// # Errors
    ///
    /// Fails if the configured name is invalid.
    pub fn ledger(&self) -> anyhow::Result<LedgerName> {
        LedgerName::new(self.ledger_name.as_str()).context("invalid ledger_name")
    }

    /// Builds the driver configuration.
    ///
    /// # Errors
    ///
    /// Fails if the ledger name or a section is invalid.
    pub fn driver_config(&self) -> anyhow::Result<DriverConfig> {
        Ok(DriverConfig::builder()
            .ledger_name(self.ledger_name.as_str())
            .pool(self.pool.clone())
            .retry(self.retry.clone())
            .build()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reproduce_demo_constants() {
        let config = QuickstartConfig::load(None).unwrap();
        assert_eq!(config.ledger_name, "MyLedger");
        assert_eq!(config.table_name, "MyTable");
        assert_eq!(config.timestamp_field, "mytabledate");
        assert_eq!(config.table_settle_delay, Duration::from_secs(5));
        assert_eq!(config.provisioning.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.retry.retry_limit(), 3);
        assert_eq!(config.service.activation_polls, 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            table_name = "Orders"
            table_settle_delay = "250ms"

            [provisioning]
            poll_interval = "1s"

            [service]
            activation_polls = 0
        "#;
        let config: QuickstartConfig = toml::from_str(text).unwrap();

        assert_eq!(config.ledger_name, "MyLedger");
        assert_eq!(config.table_name, "Orders");
        assert_eq!(config.table_settle_delay, Duration::from_millis(250));
        assert_eq!(config.provisioning.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.provisioning.timeout(), Duration::from_secs(600));
        assert_eq!(config.service.activation_polls, 0);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<QuickstartConfig>("ledger = \"x\"").is_err());
    }

    #[test]
    fn test_overrides_win_and_are_validated() {
        let overrides = Overrides {
            ledger_name: Some("Other".into()),
            poll_interval: Some(Duration::from_millis(20)),
            activation_polls: Some(5),
            ..Overrides::default()
        };
        let config = QuickstartConfig::default().with_overrides(overrides).unwrap();
        assert_eq!(config.ledger_name, "Other");
        assert_eq!(config.table_name, "MyTable");
        assert_eq!(config.provisioning.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.service.activation_polls, 5);

        let bad = Overrides { ledger_name: Some("-bad".into()), ..Overrides::default() };
        assert!(QuickstartConfig::default().with_overrides(bad).is_err());
    }

    #[test]
    fn test_driver_config_uses_sections() {
        let config = QuickstartConfig::default();
        let driver = config.driver_config().unwrap();
        assert_eq!(driver.ledger_name().as_str(), "MyLedger");
        assert_eq!(driver.retry(), &config.retry);
    }
}
