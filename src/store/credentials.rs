//! Per-tenant marketplace OAuth credentials and API keys

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::platform::Platform;
use super::supabase::{Query, SupabaseClient, SupabaseError};

const CREDENTIALS: &str = "platform_credentials";
const API_KEYS: &str = "api_keys";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredentials {
    pub user_id: Uuid,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PlatformCredentials {
    /// True when the access token is gone or expires within `margin`
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - margin <= now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CredentialStore {
    client: SupabaseClient,
}

impl CredentialStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<PlatformCredentials>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("platform", platform);
        self.client.get_one(CREDENTIALS, &query).await
    }

    pub async fn upsert(&self, credentials: &PlatformCredentials) -> Result<(), SupabaseError> {
        let _: Vec<PlatformCredentials> = self
            .client
            .upsert(
                CREDENTIALS,
                std::slice::from_ref(credentials),
                "user_id,platform",
            )
            .await?;
        Ok(())
    }

    /// Tenants connected to a platform (cron fan-out)
    pub async fn users_with_platform(&self, platform: Platform) -> Result<Vec<Uuid>, SupabaseError> {
        #[derive(Deserialize)]
        struct UserOnly {
            user_id: Uuid,
        }
        let rows: Vec<UserOnly> = self
            .client
            .get_all(
                CREDENTIALS,
                &Query::new().eq("platform", platform).select("user_id"),
            )
            .await?;
        let mut users: Vec<Uuid> = rows.into_iter().map(|r| r.user_id).collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    /// Look up a non-revoked API key by the hex SHA-256 of its secret
    pub async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, SupabaseError> {
        let query = Query::new()
            .eq("key_hash", key_hash)
            .is_null("revoked_at")
            .select("id,user_id,name,revoked_at");
        self.client.get_one(API_KEYS, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_at: Option<DateTime<Utc>>) -> PlatformCredentials {
        PlatformCredentials {
            user_id: Uuid::new_v4(),
            platform: Platform::Ebay,
            access_token: "token".into(),
            refresh_token: Some("refresh".into()),
            expires_at,
            updated_at: None,
        }
    }

    #[test]
    fn refresh_window() {
        let now = Utc::now();
        let margin = Duration::minutes(5);
        assert!(creds(Some(now + Duration::minutes(2))).needs_refresh(now, margin));
        assert!(creds(Some(now - Duration::hours(1))).needs_refresh(now, margin));
        assert!(!creds(Some(now + Duration::hours(1))).needs_refresh(now, margin));
        assert!(!creds(None).needs_refresh(now, margin));
    }
}
