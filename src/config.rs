//! Configuration management for the tip dispatcher
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::tx::TokenType;

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub inputs: InputsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_urls: Vec<String>,
    /// Queried from the node when absent
    pub chain_id: Option<u64>,
    pub contract_address: String,
    pub explorer_url: String,
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    pub max_fee_per_gas_gwei: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    pub tx_count: u32,
    #[serde(default = "default_amount")]
    pub amount_per_tx: String,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default = "default_token_address")]
    pub token_address: String,
    #[serde(default = "default_id_source")]
    pub id_source: String,
    #[serde(default = "default_gas_buffer")]
    pub gas_limit_buffer_percent: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_concurrency")]
    pub wallet_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputsConfig {
    #[serde(default = "default_wallets_file")]
    pub wallets_file: String,
    #[serde(default)]
    pub recipients: RecipientSourceConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RecipientSourceConfig {
    File {
        #[serde(default = "default_recipients_file")]
        path: String,
        #[serde(default = "default_fallback_recipient")]
        fallback: String,
    },
    Random {
        count: usize,
    },
}

impl Default for RecipientSourceConfig {
    fn default() -> Self {
        RecipientSourceConfig::File {
            path: default_recipients_file(),
            fallback: default_fallback_recipient(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Where to write the JSON run summary, if anywhere
    pub path: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_priority_fee_gwei() -> u64 {
    1
}
fn default_amount() -> String {
    "0.001".to_string()
}
fn default_token_address() -> String {
    format!("{:?}", Address::zero())
}
fn default_id_source() -> String {
    "x".to_string()
}
fn default_gas_buffer() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    2_000
}
fn default_retry_backoff_max_ms() -> u64 {
    30_000
}
fn default_submit_timeout() -> u64 {
    30
}
fn default_confirmation_timeout() -> u64 {
    180
}
fn default_confirmations() -> u64 {
    1
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_concurrency() -> usize {
    1
}
fn default_wallets_file() -> String {
    "wallets.txt".to_string()
}
fn default_recipients_file() -> String {
    "recipients.txt".to_string()
}
fn default_fallback_recipient() -> String {
    "yubileyorg".to_string()
}
fn default_metrics_port() -> u16 {
    9102
}

pub const MAX_TX_COUNT: u32 = 100;
pub const MAX_RANDOM_RECIPIENTS: usize = 100;

impl Settings {
    /// Load settings from the file named by `TIPPER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("TIPPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.is_empty() {
            anyhow::bail!("No RPC URLs configured");
        }
        self.contract_address()?;
        self.token_address()?;

        let tx_count = self.dispatch.tx_count;
        if tx_count == 0 || tx_count > MAX_TX_COUNT {
            anyhow::bail!("tx_count must be between 1 and {}, got {}", MAX_TX_COUNT, tx_count);
        }

        let amount = self.amount_per_tx_wei()?;
        if amount.is_zero() {
            anyhow::bail!("amount_per_tx must be greater than zero");
        }

        if self.dispatch.wallet_concurrency == 0 {
            anyhow::bail!("wallet_concurrency must be at least 1");
        }
        if self.dispatch.confirmations == 0 {
            anyhow::bail!("confirmations must be at least 1");
        }

        if let RecipientSourceConfig::Random { count } = self.inputs.recipients {
            if count == 0 || count > MAX_RANDOM_RECIPIENTS {
                anyhow::bail!(
                    "random recipient count must be between 1 and {}, got {}",
                    MAX_RANDOM_RECIPIENTS,
                    count
                );
            }
        }

        Ok(())
    }

    /// Tip contract address
    pub fn contract_address(&self) -> Result<Address> {
        self.network
            .contract_address
            .parse()
            .with_context(|| format!("Invalid contract address: {}", self.network.contract_address))
    }

    /// Token address placed in the tip's token descriptor
    pub fn token_address(&self) -> Result<Address> {
        self.dispatch
            .token_address
            .parse()
            .with_context(|| format!("Invalid token address: {}", self.dispatch.token_address))
    }

    /// Per-transaction amount in wei. Accepts `,` as the decimal separator.
    pub fn amount_per_tx_wei(&self) -> Result<U256> {
        parse_amount(&self.dispatch.amount_per_tx)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch.retry_delay_ms)
    }

    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_millis(self.dispatch.retry_backoff_max_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.submit_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.confirmation_timeout_secs)
    }
}

/// Parse a decimal native-unit amount into wei
pub fn parse_amount(input: &str) -> Result<U256> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return parse_amount(&default_amount());
    }
    if normalized.starts_with('-') {
        anyhow::bail!("Amount must be positive: {}", input);
    }
    parse_ether(&normalized).with_context(|| format!("Invalid amount: {}", input))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
