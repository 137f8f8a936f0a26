use crate::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MINOR_PER_UNIT: i64 = 100;

/// Positive purchase amount held as integer minor units (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub fn from_minor(minor: i64) -> Result<Self> {
        if minor <= 0 {
            return Err(Error::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        Ok(Self(minor))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Loyalty points earned for this amount: one point per whole currency unit
    pub fn points(&self) -> i64 {
        self.0 / MINOR_PER_UNIT
    }
}

impl FromStr for Amount {
    type Err = Error;

    /// Parses decimal text such as `19.99`, `5.5` or `12` without going through floats
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidAmount(format!("'{s}' is not a valid amount"));

        if let Some(rest) = s.strip_prefix('-') {
            if !rest.is_empty() {
                return Err(Error::InvalidAmount(
                    "amount must be greater than zero".to_string(),
                ));
            }
        }

        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > 2 {
            return Err(Error::InvalidAmount(format!(
                "'{s}' has more than two decimal places"
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        let minor = whole
            .checked_mul(MINOR_PER_UNIT)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?;

        Self::from_minor(minor)
    }
}

impl TryFrom<i64> for Amount {
    type Error = Error;

    fn try_from(minor: i64) -> Result<Self> {
        Self::from_minor(minor)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / MINOR_PER_UNIT,
            self.0 % MINOR_PER_UNIT
        )
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
