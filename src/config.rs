use crate::models::{parse_token_amount, USDC_DECIMALS};
use crate::services::{ai::DEFAULT_MODEL, ai::DEFAULT_OPENROUTER_URL, hashing::DEFAULT_CACHE_VERSION};
use anyhow::{bail, Context, Result};
use ethers::types::{Address, U256};
use std::str::FromStr;
use std::time::Duration;

/// USDC on Base mainnet.
const DEFAULT_USDC_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Payment network
    pub rpc_url: String,
    pub chain_id: u64,
    pub usdc_address: Address,
    pub recipient_address: Address,
    pub payment_amount: U256,
    pub payment_token: String,

    // Receipts
    pub server_private_key: Option<String>,
    pub receipt_ttl: Duration,

    // AI provider
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub openrouter_url: String,
    pub ai_timeout: Duration,
    pub max_text_length: usize,

    // Response cache
    pub cache_version: String,
    pub cache_ttl: Duration,
    pub redis_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("recipient_address", &self.recipient_address)
            .field("payment_amount", &self.payment_amount)
            .field("signing_key", &self.server_private_key.as_ref().map(|_| "<redacted>"))
            .field("openrouter_model", &self.openrouter_model)
            .field("cache_version", &self.cache_version)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let environment = Self::parse_environment(&or_default("ENVIRONMENT", "development"))?;

        let payment_amount_str = or_default("PAYMENT_AMOUNT", "0.001");
        let payment_amount = parse_token_amount(&payment_amount_str, USDC_DECIMALS)
            .with_context(|| format!("Invalid PAYMENT_AMOUNT: {}", payment_amount_str))?;

        let config = Self {
            environment,
            host: or_default("HOST", "0.0.0.0"),
            port: or_default("PORT", "3000").parse().context("Invalid PORT")?,

            rpc_url: or_default("RPC_URL", "https://mainnet.base.org"),
            chain_id: or_default("CHAIN_ID", "8453")
                .parse()
                .context("Invalid CHAIN_ID")?,
            usdc_address: Self::parse_address("USDC_ADDRESS", &or_default("USDC_ADDRESS", DEFAULT_USDC_ADDRESS))?,
            recipient_address: Self::parse_address(
                "RECIPIENT_ADDRESS",
                &var("RECIPIENT_ADDRESS").context("RECIPIENT_ADDRESS required")?,
            )?,
            payment_amount,
            payment_token: or_default("PAYMENT_TOKEN", "USDC"),

            server_private_key: var("SERVER_WALLET_PRIVATE_KEY"),
            receipt_ttl: Duration::from_secs(
                or_default("RECEIPT_TTL_SECS", "86400")
                    .parse()
                    .context("Invalid RECEIPT_TTL_SECS")?,
            ),

            openrouter_api_key: var("OPENROUTER_API_KEY"),
            openrouter_model: or_default("OPENROUTER_MODEL", DEFAULT_MODEL),
            openrouter_url: or_default("OPENROUTER_URL", DEFAULT_OPENROUTER_URL),
            ai_timeout: Duration::from_secs(
                or_default("AI_TIMEOUT_SECS", "30")
                    .parse()
                    .context("Invalid AI_TIMEOUT_SECS")?,
            ),
            max_text_length: or_default("MAX_TEXT_LENGTH", "20000")
                .parse()
                .context("Invalid MAX_TEXT_LENGTH")?,

            cache_version: or_default("CACHE_VERSION", DEFAULT_CACHE_VERSION),
            cache_ttl: Duration::from_secs(
                or_default("CACHE_TTL_SECS", "3600")
                    .parse()
                    .context("Invalid CACHE_TTL_SECS")?,
            ),
            redis_url: var("REDIS_URL"),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_address(var: &str, value: &str) -> Result<Address> {
        Address::from_str(value.trim()).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("RPC_URL must be HTTP(S) URL");
        }
        if !self.openrouter_url.starts_with("http") {
            bail!("OPENROUTER_URL must be HTTP(S) URL");
        }
        if self.payment_amount.is_zero() {
            bail!("PAYMENT_AMOUNT must be greater than zero");
        }
        if self.receipt_ttl.is_zero() {
            bail!("RECEIPT_TTL_SECS must be greater than zero");
        }
        if self.cache_ttl.is_zero() {
            bail!("CACHE_TTL_SECS must be greater than zero");
        }
        if self.max_text_length == 0 {
            bail!("MAX_TEXT_LENGTH must be greater than zero");
        }

        if self.server_private_key.is_none() {
            if self.environment == Environment::Production {
                bail!("SERVER_WALLET_PRIVATE_KEY required in production");
            }
            tracing::warn!("SERVER_WALLET_PRIVATE_KEY not set, receipts will not be signed");
        }
        if self.openrouter_api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set, summarization requests will fail");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
