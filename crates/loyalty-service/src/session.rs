//! Server-side sessions: opaque cookie token mapped to a small record

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Duration, Utc};
use loyalty_common::{CustomerId, Error, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handlers::{ApiError, AppState};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "loyalty_session";

/// What a session is allowed to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Admin logged in
    pub admin: bool,

    /// Customer logged in, with their identifier
    pub customer_id: Option<CustomerId>,

    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Admins see every dashboard, customers only their own
    pub fn can_view(&self, customer_id: &CustomerId) -> bool {
        self.admin || self.customer_id.as_ref() == Some(customer_id)
    }
}

/// Persistence for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, token: &str, record: &SessionRecord) -> Result<()>;

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>>;

    async fn destroy(&self, token: &str) -> Result<()>;

    /// Drop records past their expiry, returning how many were removed
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}

/// Process-local session store
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, token: &str, record: &SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now));
        Ok(before - sessions.len())
    }
}

/// Redis-backed session store; expiry is delegated to key TTLs
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(session_error)?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(session_error)?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn key(token: &str) -> String {
        format!("session:{}", token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(&self, token: &str, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| Error::Session(format!("Failed to serialize session: {e}")))?;
        let ttl_secs = (record.expires_at - Utc::now()).num_seconds().max(1);

        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::key(token))
            .arg(json)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(session_error)
    }

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(Self::key(token)).await.map_err(session_error)?;

        match json {
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| Error::Session(format!("Failed to deserialize session: {e}"))),
            None => Ok(None),
        }
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(token)).await.map_err(session_error)?;
        Ok(())
    }
}

fn session_error(err: redis::RedisError) -> Error {
    Error::Session(err.to_string())
}

/// Session lifecycle on top of a [`SessionStore`]
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live session; expired records are removed and reported as absent
    pub async fn resolve(&self, token: &str) -> Result<Option<SessionRecord>> {
        match self.store.load(token).await? {
            Some(record) if record.is_expired(Utc::now()) => {
                debug!("Session expired");
                self.store.destroy(token).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Mark the caller as admin, keeping any customer login, under a fresh token
    pub async fn login_admin(&self, current: &CurrentSession) -> Result<String> {
        self.rotate(current, |record| record.admin = true).await
    }

    /// Mark the caller as `customer_id`, keeping any admin login, under a fresh token
    pub async fn login_customer(
        &self,
        current: &CurrentSession,
        customer_id: CustomerId,
    ) -> Result<String> {
        self.rotate(current, move |record| record.customer_id = Some(customer_id))
            .await
    }

    async fn rotate(
        &self,
        current: &CurrentSession,
        apply: impl FnOnce(&mut SessionRecord) + Send,
    ) -> Result<String> {
        let mut record = current.record.clone().unwrap_or(SessionRecord {
            admin: false,
            customer_id: None,
            expires_at: Utc::now(),
        });
        apply(&mut record);
        record.expires_at = Utc::now() + self.ttl;

        if let Some(old) = &current.token {
            self.store.destroy(old).await?;
        }

        let token = Uuid::new_v4().to_string();
        self.store.save(&token, &record).await?;
        Ok(token)
    }

    /// Forget the caller's session; store failures are logged, never returned
    pub async fn logout(&self, current: &CurrentSession) {
        if let Some(token) = &current.token {
            if let Err(e) = self.store.destroy(token).await {
                warn!("Failed to destroy session: {}", e);
            }
        }
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(Utc::now()).await
    }

    /// `Set-Cookie` value for a freshly issued token
    pub fn cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.ttl.num_seconds()
        )
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            SESSION_COOKIE
        )
    }
}

/// Extract the session token from the `Cookie` headers
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Session of the current request: anonymous when `record` is `None`
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    pub token: Option<String>,
    pub record: Option<SessionRecord>,
}

impl CurrentSession {
    pub fn is_admin(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.admin)
    }

    pub fn can_view(&self, customer_id: &CustomerId) -> bool {
        self.record.as_ref().is_some_and(|r| r.can_view(customer_id))
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        let record = match &token {
            Some(token) => state.sessions.resolve(token).await?,
            None => None,
        };

        Ok(Self { token, record })
    }
}
