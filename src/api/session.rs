use async_trait::async_trait;

use crate::config::BrokerConfig;
use crate::error::TradingError;
use crate::Result;

/// Credentials of an authorized broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub api_key: String,
    pub access_token: String,
}

impl Session {
    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }
}

/// Source of an authorized session at process start
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn authorized_session(&self) -> Result<Session>;
}

/// Session taken from configuration; the token is obtained out of band each morning
pub struct ConfigSessionProvider {
    config: BrokerConfig,
}

impl ConfigSessionProvider {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionProvider for ConfigSessionProvider {
    async fn authorized_session(&self) -> Result<Session> {
        if self.config.api_key.is_empty() || self.config.access_token.is_empty() {
            return Err(TradingError::Config(
                "broker.api_key and broker.access_token are required for live trading".into(),
            ));
        }

        Ok(Session {
            api_key: self.config.api_key.clone(),
            access_token: self.config.access_token.clone(),
        })
    }
}
