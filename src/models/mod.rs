pub mod response;
pub mod payment;
pub mod receipt;

pub use response::*;
pub use payment::*;
pub use receipt::*;
