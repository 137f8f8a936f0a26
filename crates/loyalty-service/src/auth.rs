//! Admin credential verification

use async_trait::async_trait;
use loyalty_common::{Error, Result};
use subtle::ConstantTimeEq;

/// Verifies admin credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(())` when the pair is accepted, `Err(InvalidCredentials)` otherwise
    async fn authenticate(&self, username: &str, password: &str) -> Result<()>;
}

/// Single admin account taken from configuration
pub struct StaticCredentials {
    username: String,
    password: Option<String>,
}

impl StaticCredentials {
    /// Without a password every login attempt is refused
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.password.is_some()
    }
}

#[async_trait]
impl Authenticator for StaticCredentials {
    async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let Some(expected) = &self.password else {
            return Err(Error::InvalidCredentials);
        };

        let username_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let password_ok = expected.as_bytes().ct_eq(password.as_bytes());

        if bool::from(username_ok & password_ok) {
            Ok(())
        } else {
            Err(Error::InvalidCredentials)
        }
    }
}
