use anyhow::{Context, Result};
use microai_paygate::{
    config::Config,
    middleware::{OnChainVerifier, PaymentTerms, PaymentVerifier},
    routes::build_router,
    services::*,
    state::{AppState, RequestLimits},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting microai-paygate v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let cache = Arc::new(CacheService::new(config.redis_url.as_deref(), config.cache_ttl).await);
    let analytics = Arc::new(Analytics::new(cache.clone()));

    let signer = ReceiptSigner::from_optional_key(config.server_private_key.as_deref())
        .context("Invalid SERVER_WALLET_PRIVATE_KEY")?;
    if let Some(signer) = &signer {
        tracing::info!(
            address = ?signer.address(),
            public_key = %signer.public_key(),
            "Receipt signing enabled"
        );
    }

    let store = Arc::new(ReceiptStore::new(config.receipt_ttl));
    let janitor = store.spawn_janitor(JANITOR_INTERVAL);
    let issuer = Arc::new(ReceiptIssuer::new(ReceiptMinter::default(), signer, store));

    let summarizer = Arc::new(OpenRouterClient::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
        config.openrouter_url.clone(),
    ));

    // Payment verification
    let terms = PaymentTerms {
        recipient: config.recipient_address,
        token_address: config.usdc_address,
        token_symbol: config.payment_token.clone(),
        amount: config.payment_amount,
        chain_id: config.chain_id,
    };
    tracing::info!(
        "Price: {} {} per request on chain {}",
        terms.display_amount(),
        terms.token_symbol,
        terms.chain_id
    );
    let verifier: Arc<dyn PaymentVerifier> = Arc::new(OnChainVerifier::new(&config.rpc_url, terms)?);

    // Build application state
    let state = AppState {
        summarizer,
        cache,
        cache_keys: CacheKeyDeriver::new(config.cache_version.clone()),
        issuer,
        analytics,
        limits: RequestLimits {
            max_text_length: config.max_text_length,
            ai_timeout: config.ai_timeout,
        },
    };

    let app = build_router(state, verifier);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    janitor.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
