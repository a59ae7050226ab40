use crate::models::{format_token_amount, parse_token_amount, USDC_DECIMALS};
use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, U256},
};
use std::sync::Arc;

// USDC contract ABI for transfer function
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

/// Pays for gateway requests with a USDC transfer.
pub struct PaymentClient {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    usdc_address: Address,
}

impl PaymentClient {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        chain_id: u64,
        usdc_address: Address,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid wallet private key")?
            .with_chain_id(chain_id);

        let provider = Arc::new(SignerMiddleware::new(provider, wallet));

        Ok(Self {
            provider,
            usdc_address,
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    /// Transfer `amount` (a decimal string such as `"0.001"`) and wait for
    /// the transaction to be mined.
    pub async fn send_usdc_payment(&self, amount: &str, recipient: Address) -> Result<H256> {
        let amount_units = parse_token_amount(amount, USDC_DECIMALS)
            .with_context(|| format!("Invalid USDC amount: {}", amount))?;

        tracing::info!("Sending {} USDC to {:?}", amount, recipient);

        // Check balance first
        let balance = self.usdc_balance_units().await?;
        if balance < amount_units {
            anyhow::bail!(
                "Insufficient USDC balance: {} < {}",
                format_token_amount(balance, USDC_DECIMALS),
                format_token_amount(amount_units, USDC_DECIMALS)
            );
        }

        tracing::info!(
            "Current USDC balance: {}",
            format_token_amount(balance, USDC_DECIMALS)
        );

        let usdc = IERC20::new(self.usdc_address, self.provider.clone());
        let tx = usdc.transfer(recipient, amount_units);
        let pending_tx = tx.send().await.context("Failed to send USDC transfer")?;

        tracing::info!("Transaction sent, waiting for confirmation...");

        let receipt = pending_tx
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            anyhow::bail!("Transaction failed onchain");
        }

        tracing::info!("Payment confirmed: {:?}", receipt.transaction_hash);

        Ok(receipt.transaction_hash)
    }

    async fn usdc_balance_units(&self) -> Result<U256> {
        let usdc = IERC20::new(self.usdc_address, self.provider.clone());
        Ok(usdc.balance_of(self.provider.address()).call().await?)
    }

    /// Balance in base units alongside its decimal rendering.
    pub async fn get_usdc_balance(&self) -> Result<(U256, String)> {
        let balance = self.usdc_balance_units().await?;
        Ok((balance, format_token_amount(balance, USDC_DECIMALS)))
    }
}
