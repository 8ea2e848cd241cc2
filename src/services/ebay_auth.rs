//! Resolves a usable eBay access token for a tenant, refreshing when close to expiry

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::clients::{EbayClient, EbayError};
use crate::store::credentials::PlatformCredentials;
use crate::store::supabase::SupabaseError;
use crate::store::{CredentialStore, Platform};

/// Refresh tokens expiring within this window
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, user_id: Uuid) -> Result<String, TokenError>;
}

#[derive(Clone)]
pub struct EbayTokens {
    credentials: CredentialStore,
    ebay: EbayClient,
}

impl EbayTokens {
    pub fn new(credentials: CredentialStore, ebay: EbayClient) -> Self {
        Self { credentials, ebay }
    }
}

#[async_trait]
impl TokenProvider for EbayTokens {
    async fn access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        let stored = self
            .credentials
            .get(user_id, Platform::Ebay)
            .await?
            .ok_or(TokenError::NotConnected)?;

        if !stored.needs_refresh(Utc::now(), Duration::minutes(REFRESH_MARGIN_MINUTES)) {
            return Ok(stored.access_token);
        }

        let refresh_token = stored
            .refresh_token
            .as_deref()
            .ok_or(TokenError::Expired)?;
        let fresh = self.ebay.refresh_access_token(refresh_token).await?;

        self.credentials
            .upsert(&PlatformCredentials {
                access_token: fresh.access_token.clone(),
                expires_at: Some(fresh.expires_at),
                updated_at: Some(Utc::now()),
                ..stored
            })
            .await?;

        info!(user_id = %user_id, "Refreshed eBay access token");
        Ok(fresh.access_token)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("eBay account is not connected")]
    NotConnected,

    #[error("eBay session expired; reconnect the account")]
    Expired,

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Token refresh failed: {0}")]
    Ebay(#[from] EbayError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::config_for;
    use crate::store::SupabaseClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_saved() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let soon = Utc::now() + Duration::minutes(1);

        Mock::given(method("GET"))
            .and(path("/rest/v1/platform_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": user_id,
                "platform": "ebay",
                "access_token": "stale",
                "refresh_token": "refresh",
                "expires_at": soon,
                "updated_at": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/identity/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/platform_credentials"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server.uri());
        let tokens = EbayTokens::new(
            CredentialStore::new(SupabaseClient::new(&config)),
            EbayClient::new(&config),
        );
        assert_eq!(tokens.access_token(user_id).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn missing_credentials_means_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(406))
            .mount(&server)
            .await;

        let config = config_for(&server.uri());
        let tokens = EbayTokens::new(
            CredentialStore::new(SupabaseClient::new(&config)),
            EbayClient::new(&config),
        );
        let err = tokens.access_token(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TokenError::NotConnected));
    }
}
