use anyhow::{Context, Result};
use ethers::types::Address;
use microai_paygate::{
    client::PaymentClient,
    middleware::{PAYMENT_HEADER, PAYMENT_NONCE_HEADER},
    models::{PaymentContext, SummarizeResponse},
    services::{verify_signed_receipt, verify_with_operator_key},
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::str::FromStr;

const SAMPLE_TEXT: &str = "Rust is a multi-paradigm, general-purpose programming language \
    that emphasizes performance, type safety, and concurrency. It enforces memory safety \
    without a garbage collector by tracking ownership and lifetimes at compile time.";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let base_url = std::env::var("PAYGATE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let test_wallet_private_key =
        std::env::var("TEST_WALLET_PRIVATE_KEY").context("TEST_WALLET_PRIVATE_KEY required")?;
    let rpc_url = std::env::var("RPC_URL").context("RPC_URL required")?;
    let expected_key = std::env::var("EXPECTED_SERVER_PUBLIC_KEY").ok();
    let text = std::env::var("SUMMARY_TEXT").unwrap_or_else(|_| SAMPLE_TEXT.to_string());

    println!("MicroAI Paygate Test Agent");
    println!("==========================");
    println!("Server: {}", base_url);
    println!();

    let client = Client::new();
    let url = format!("{}/api/ai/summarize", base_url);
    let body = json!({ "text": text });

    println!("Step 1: Making initial request (expecting 402)...");
    let response = client.post(&url).json(&body).send().await?;

    if response.status() != StatusCode::PAYMENT_REQUIRED {
        anyhow::bail!("Expected 402 Payment Required, got {}", response.status());
    }
    println!("   [OK] Received 402 Payment Required");

    let challenge: Value = response.json().await?;
    let context: PaymentContext = serde_json::from_value(
        challenge
            .get("paymentContext")
            .cloned()
            .context("402 response carried no paymentContext")?,
    )?;
    println!(
        "   Pay {} {} to {} on chain {}",
        context.amount, context.token, context.recipient, context.chain_id
    );
    println!();

    // Initialize payment client
    let payment_client = PaymentClient::new(
        &rpc_url,
        &test_wallet_private_key,
        context.chain_id,
        Address::from_str(&context.token_address)?,
    )?;

    let (_, balance) = payment_client.get_usdc_balance().await?;
    println!("Your USDC balance: {}", balance);

    println!("Step 2: Sending {} payment...", context.token);
    let tx_hash = payment_client
        .send_usdc_payment(&context.amount, Address::from_str(&context.recipient)?)
        .await?;
    println!("   [OK] Payment sent: {:?}", tx_hash);
    println!();

    println!("Step 3: Retrying request with payment proof...");
    let response = client
        .post(&url)
        .header(PAYMENT_HEADER, format!("{:?}", tx_hash))
        .header(PAYMENT_NONCE_HEADER, &context.nonce)
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        anyhow::bail!("Request failed: {}", error_text);
    }

    let summary: SummarizeResponse = response.json().await?;
    println!("   [OK] Payment verified!");
    println!();
    println!("Summary ({}):", summary.model);
    println!("{}", summary.result);
    println!();

    println!("Step 4: Verifying receipt offline...");
    let Some(receipt) = summary.receipt else {
        println!("   [WARN] Server returned no receipt (signing disabled)");
        return Ok(());
    };

    let verified = match &expected_key {
        Some(key) => verify_with_operator_key(&receipt, key),
        None => verify_signed_receipt(&receipt),
    };

    match verified {
        Ok(()) => {
            println!("   [OK] Receipt {} signature valid", receipt.receipt.id);
            if expected_key.is_none() {
                println!("   Set EXPECTED_SERVER_PUBLIC_KEY to pin the operator key");
            }
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Err(e) => println!("   [FAILED] {}", e),
    }

    Ok(())
}
