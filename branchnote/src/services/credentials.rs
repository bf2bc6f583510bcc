/// Credentials
/// Bearer credential supplied by the authentication collaborator, with a
/// refresh hook the engine calls once when the server rejects a token.
use crate::config::KEYRING_SERVICE;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use keyring::Entry;
use std::collections::VecDeque;
use std::sync::Mutex;

const ACCESS_TOKEN_KEY: &str = "access_token";

#[async_trait]
pub trait Credentials: Send + Sync {
    /// Current bearer token, if signed in
    async fn token(&self) -> Option<String>;

    /// Obtain a fresh token. Fails with `Unauthorized` when the session
    /// cannot be renewed.
    async fn refresh(&self) -> Result<()>;
}

/// Fixed token, with an optional queue of tokens handed out on refresh
pub struct StaticCredentials {
    token: Mutex<Option<String>>,
    refreshed: Mutex<VecDeque<String>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
            refreshed: Mutex::new(VecDeque::new()),
        }
    }

    /// Signed out: no token and nothing to refresh with
    pub fn none() -> Self {
        Self {
            token: Mutex::new(None),
            refreshed: Mutex::new(VecDeque::new()),
        }
    }

    /// Token that a later `refresh` will switch to
    pub fn with_refresh(self, token: impl Into<String>) -> Self {
        self.refreshed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(token.into());
        self
    }
}

#[async_trait]
impl Credentials for StaticCredentials {
    async fn token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn refresh(&self) -> Result<()> {
        let next = self
            .refreshed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();

        match next {
            Some(token) => {
                *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(token);
                tracing::info!("Credential refreshed");
                Ok(())
            }
            None => Err(AppError::Unauthorized),
        }
    }
}

/// Token kept in the OS credential store.
///
/// Sign-in happens elsewhere; `refresh` re-reads the stored entry, picking
/// up a token renewed by the authentication collaborator.
pub struct KeyringCredentials {
    account: String,
    cached: Mutex<Option<String>>,
}

impl KeyringCredentials {
    pub fn new(account: impl Into<String>) -> Self {
        let credentials = Self {
            account: account.into(),
            cached: Mutex::new(None),
        };
        let stored = credentials.read_entry().ok();
        *credentials.cached.lock().unwrap_or_else(|p| p.into_inner()) = stored;
        credentials
    }

    fn entry(&self) -> Result<Entry> {
        let user = format!("{}:{}", self.account, ACCESS_TOKEN_KEY);
        Entry::new(KEYRING_SERVICE, &user)
            .map_err(|e| AppError::Generic(format!("Failed to open keyring entry: {}", e)))
    }

    fn read_entry(&self) -> Result<String> {
        self.entry()?
            .get_password()
            .map_err(|_| AppError::Unauthorized)
    }

    /// Store a token issued by the authentication collaborator
    pub fn store(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| AppError::Generic(format!("Failed to store credential: {}", e)))?;
        *self.cached.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());

        tracing::info!("Credential stored in OS credential store");
        Ok(())
    }

    /// Remove the stored token
    pub fn clear(&self) -> Result<()> {
        *self.cached.lock().unwrap_or_else(|p| p.into_inner()) = None;
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => {
                return Err(AppError::Generic(format!("Failed to delete credential: {}", e)))
            }
        }

        tracing::info!("Credential removed from OS credential store");
        Ok(())
    }
}

#[async_trait]
impl Credentials for KeyringCredentials {
    async fn token(&self) -> Option<String> {
        self.cached.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn refresh(&self) -> Result<()> {
        let previous = self.token().await;
        let stored = self.read_entry()?;

        if Some(&stored) == previous.as_ref() {
            return Err(AppError::Unauthorized);
        }

        *self.cached.lock().unwrap_or_else(|p| p.into_inner()) = Some(stored);
        tracing::info!("Credential reloaded from OS credential store");
        Ok(())
    }
}
