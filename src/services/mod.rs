pub mod ai;
pub mod analytics;
pub mod cache;
pub mod hashing;
pub mod issuer;
pub mod minter;
pub mod receipt_store;
pub mod signer;

pub use ai::{OpenRouterClient, Summarizer};
pub use analytics::Analytics;
pub use cache::CacheService;
pub use hashing::{derive_cache_key, hash_data, CacheKeyDeriver};
pub use issuer::ReceiptIssuer;
pub use minter::{OsRandomSource, RandomSource, ReceiptMinter};
pub use receipt_store::{ReceiptStore, StoreJanitor, DEFAULT_RECEIPT_TTL};
pub use signer::{
    recover_public_key, verify_signed_receipt, verify_with_operator_key, ReceiptSigner,
};
