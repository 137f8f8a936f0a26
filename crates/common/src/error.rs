use std::fmt;
use thiserror::Error;

/// Customer field that collided with an existing registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Phone,
    Email,
    CustomerId,
}

impl fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DuplicateField::Phone => "phone",
            DuplicateField::Email => "email",
            DuplicateField::CustomerId => "customer_id",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Customer already exists with this {field}")]
    DuplicateCustomer { field: DuplicateField },

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Invalid admin credentials")]
    InvalidCredentials,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrent update conflict, retry the request")]
    TransactionConflict,

    #[error("Login required")]
    NotAuthenticated,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session store error: {0}")]
    Session(String),
}

impl Error {
    /// True for conditions the caller can fix or retry; false for store failures
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Storage(_) | Error::Session(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_field() {
        let err = Error::DuplicateCustomer {
            field: DuplicateField::Email,
        };
        assert_eq!(err.to_string(), "Customer already exists with this email");
    }

    #[test]
    fn test_only_store_failures_are_fatal() {
        assert!(Error::TransactionConflict.is_recoverable());
        assert!(Error::CustomerNotFound("TNM00001".into()).is_recoverable());
        assert!(!Error::Storage("disk I/O error".into()).is_recoverable());
    }
}
