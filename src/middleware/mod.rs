pub mod x402;

pub use x402::{
    payment_middleware, OnChainVerifier, PaymentTerms, PaymentVerifier, PAYMENT_HEADER,
    PAYMENT_NONCE_HEADER,
};
