pub mod health;
pub mod receipts;
pub mod stats;
pub mod summarize;

pub use health::*;
pub use receipts::*;
pub use stats::*;
pub use summarize::*;
