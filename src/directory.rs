//! Player lookup at socket connect

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Player details resolved from a session token
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(rename = "operatorId")]
    pub operator_id: String,
    #[serde(default)]
    pub name: String,
    pub balance: Decimal,
}

impl UserProfile {
    /// Stable avatar slot derived from the player identity
    pub fn avatar(&self) -> u32 {
        let id = format!("{}:{}", self.operator_id, self.user_id);
        id.chars().map(|c| c as u32).sum::<u32>() % 10
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("token not recognised")]
    UnknownToken,

    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, token: &str, game_id: &str) -> Result<UserProfile, DirectoryError>;
}

#[derive(Deserialize)]
struct UserDetailResponse {
    user: Option<UserProfile>,
}

pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn resolve(&self, token: &str, _game_id: &str) -> Result<UserProfile, DirectoryError> {
        let response = self
            .client
            .get(format!("{}/service/user/detail", self.base_url))
            .header("token", token)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(DirectoryError::UnknownToken)
            }
            status if !status.is_success() => {
                return Err(DirectoryError::Unavailable(status.to_string()))
            }
            _ => {}
        }

        let body: UserDetailResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("invalid response: {}", e)))?;
        body.user.ok_or(DirectoryError::UnknownToken)
    }
}
