//! Stock purchases (car boots, retail, auctions)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{Page, Query, SupabaseClient, SupabaseError};

const TABLE: &str = "purchases";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purchase_date: NaiveDate,
    pub short_description: String,
    pub cost: f64,
    pub source: Option<String>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub purchase_date: NaiveDate,
    pub short_description: String,
    pub cost: f64,
    pub source: Option<String>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct PurchaseStore {
    client: SupabaseClient,
}

impl PurchaseStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Purchase>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("purchase_date.desc");
        self.client.get_page(TABLE, &query, offset, limit).await
    }

    pub async fn list_in_range(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Purchase>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .gte("purchase_date", from)
            .lte("purchase_date", to);
        self.client.get_all(TABLE, &query).await
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Purchase>, SupabaseError> {
        self.client
            .get_one(TABLE, &Query::new().eq("user_id", user_id).eq("id", id))
            .await
    }

    pub async fn create(&self, purchase: &NewPurchase) -> Result<Purchase, SupabaseError> {
        self.client.insert(TABLE, purchase).await
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        update: &PurchaseUpdate,
    ) -> Result<Option<Purchase>, SupabaseError> {
        let rows: Vec<Purchase> = self
            .client
            .update_returning(
                TABLE,
                &Query::new().eq("user_id", user_id).eq("id", id),
                update,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Hard delete; the caller checks for linked inventory first
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), SupabaseError> {
        self.client
            .delete(TABLE, &Query::new().eq("user_id", user_id).eq("id", id))
            .await
    }
}
