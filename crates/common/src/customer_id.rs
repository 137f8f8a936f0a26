use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIX: &str = "TNM";
const MIN_DIGITS: usize = 5;

/// Human-facing customer code, `TNM` followed by a zero-padded sequence number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(String);

impl CustomerId {
    /// Build the identifier for the `sequence`-th registered customer (1-based)
    pub fn from_sequence(sequence: u64) -> Result<Self> {
        if sequence == 0 {
            return Err(Error::InvalidInput(
                "customer sequence starts at 1".to_string(),
            ));
        }
        Ok(Self(format!("{PREFIX}{sequence:0width$}", width = MIN_DIGITS)))
    }

    /// Validate a user-supplied identifier
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::CustomerNotFound(s.to_string()))?;

        if digits.len() < MIN_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::CustomerNotFound(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CustomerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CustomerId> for String {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

impl AsRef<str> for CustomerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
