pub mod amount;
pub mod customer_id;
pub mod error;

pub use amount::Amount;
pub use customer_id::CustomerId;
pub use error::{DuplicateField, Error, Result};
