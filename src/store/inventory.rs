//! Inventory items - the stock ledger for every tenant

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{Page, Query, SupabaseClient, SupabaseError};

const TABLE: &str = "inventory_items";

/// Where an item sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InventoryStatus {
    #[serde(rename = "NOT YET RECEIVED")]
    NotYetReceived,
    #[serde(rename = "BACKLOG")]
    Backlog,
    #[serde(rename = "LISTED")]
    Listed,
    #[serde(rename = "SOLD")]
    Sold,
    #[serde(rename = "RETURNED")]
    Returned,
}

impl InventoryStatus {
    pub const ALL: [InventoryStatus; 5] = [
        InventoryStatus::NotYetReceived,
        InventoryStatus::Backlog,
        InventoryStatus::Listed,
        InventoryStatus::Sold,
        InventoryStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::NotYetReceived => "NOT YET RECEIVED",
            InventoryStatus::Backlog => "BACKLOG",
            InventoryStatus::Listed => "LISTED",
            InventoryStatus::Sold => "SOLD",
            InventoryStatus::Returned => "RETURNED",
        }
    }

    pub fn can_transition_to(&self, next: InventoryStatus) -> bool {
        use InventoryStatus::*;
        matches!(
            (self, next),
            (NotYetReceived, Backlog)
                | (Backlog, Listed)
                | (Listed, Backlog)
                | (Listed, Sold)
                | (Backlog, Sold)
                | (Sold, Returned)
                | (Returned, Backlog)
        )
    }
}

impl std::fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InventoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown inventory status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCondition {
    New,
    Used,
}

/// Inventory row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sku: Option<String>,
    pub set_number: Option<String>,
    pub item_name: Option<String>,
    pub condition: Option<ItemCondition>,
    pub status: InventoryStatus,
    pub cost: Option<f64>,
    pub listing_value: Option<f64>,
    pub listing_platform: Option<String>,
    pub storage_location: Option<String>,
    pub purchase_id: Option<Uuid>,
    pub amazon_asin: Option<String>,
    pub ebay_listing_id: Option<String>,
    pub sold_date: Option<NaiveDate>,
    pub sold_price: Option<f64>,
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn label(&self) -> String {
        match (&self.set_number, &self.item_name) {
            (Some(set), Some(name)) => format!("{} {}", set, name),
            (Some(set), None) => set.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => self.id.to_string(),
        }
    }
}

/// New inventory row for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewInventoryItem {
    pub user_id: Uuid,
    pub sku: Option<String>,
    pub set_number: Option<String>,
    pub item_name: Option<String>,
    pub condition: Option<ItemCondition>,
    pub status: InventoryStatus,
    pub cost: Option<f64>,
    pub listing_value: Option<f64>,
    pub listing_platform: Option<String>,
    pub storage_location: Option<String>,
    pub purchase_id: Option<Uuid>,
    pub amazon_asin: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ItemCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amazon_asin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebay_listing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl InventoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.sku.is_none()
            && self.set_number.is_none()
            && self.item_name.is_none()
            && self.condition.is_none()
            && self.cost.is_none()
            && self.listing_value.is_none()
            && self.listing_platform.is_none()
            && self.storage_location.is_none()
            && self.amazon_asin.is_none()
            && self.ebay_listing_id.is_none()
            && self.notes.is_none()
    }
}

/// Status change, with sale details when moving to SOLD
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub status: InventoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sold_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sold_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// List filters
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    pub status: Option<InventoryStatus>,
    pub platform: Option<String>,
    pub search: Option<String>,
}

/// Inventory store operations
#[derive(Clone)]
pub struct InventoryStore {
    client: SupabaseClient,
}

impl InventoryStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn scoped(user_id: Uuid) -> Query {
        Query::new().eq("user_id", user_id).is_null("deleted_at")
    }

    /// Page through a user's live inventory, newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &InventoryFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<InventoryItem>, SupabaseError> {
        let mut query = Self::scoped(user_id);
        if let Some(status) = filter.status {
            query = query.eq("status", status);
        }
        if let Some(platform) = &filter.platform {
            query = query.eq("listing_platform", platform);
        }
        if let Some(search) = filter.search.as_deref().map(sanitize_search) {
            if !search.is_empty() {
                query = query.or(&format!(
                    "sku.ilike.*{s}*,item_name.ilike.*{s}*,set_number.ilike.*{s}*",
                    s = search
                ));
            }
        }
        self.client
            .get_page(TABLE, &query.order("created_at.desc"), offset, limit)
            .await
    }

    /// Every non-deleted item for a user
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<InventoryItem>, SupabaseError> {
        self.client
            .get_all(TABLE, &Self::scoped(user_id).order("created_at.asc"))
            .await
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<InventoryItem>, SupabaseError> {
        self.client
            .get_one(TABLE, &Self::scoped(user_id).eq("id", id))
            .await
    }

    pub async fn find_by_sku(
        &self,
        user_id: Uuid,
        sku: &str,
    ) -> Result<Vec<InventoryItem>, SupabaseError> {
        self.client
            .get(TABLE, &Self::scoped(user_id).eq("sku", sku))
            .await
    }

    /// Items referencing a purchase, soft-deleted ones included since they still hold the FK
    pub async fn count_for_purchase(
        &self,
        user_id: Uuid,
        purchase_id: Uuid,
    ) -> Result<usize, SupabaseError> {
        #[derive(Deserialize)]
        struct IdOnly {
            #[allow(dead_code)]
            id: Uuid,
        }
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("purchase_id", purchase_id)
            .select("id");
        let rows: Vec<IdOnly> = self.client.get(TABLE, &query).await?;
        Ok(rows.len())
    }

    pub async fn create(&self, item: &NewInventoryItem) -> Result<InventoryItem, SupabaseError> {
        self.client.insert(TABLE, item).await
    }

    /// Apply a partial update; `None` when the item does not exist for this user
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        update: &InventoryUpdate,
    ) -> Result<Option<InventoryItem>, SupabaseError> {
        #[derive(Serialize)]
        struct Stamped<'a> {
            #[serde(flatten)]
            update: &'a InventoryUpdate,
            updated_at: DateTime<Utc>,
        }
        let rows: Vec<InventoryItem> = self
            .client
            .update_returning(
                TABLE,
                &Self::scoped(user_id).eq("id", id),
                &Stamped {
                    update,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn set_status(
        &self,
        user_id: Uuid,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<InventoryItem>, SupabaseError> {
        let rows: Vec<InventoryItem> = self
            .client
            .update_returning(TABLE, &Self::scoped(user_id).eq("id", id), change)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Soft delete; returns false when nothing matched
    pub async fn soft_delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, SupabaseError> {
        #[derive(Serialize)]
        struct Deleted {
            deleted_at: DateTime<Utc>,
        }
        let rows: Vec<InventoryItem> = self
            .client
            .update_returning(
                TABLE,
                &Self::scoped(user_id).eq("id", id),
                &Deleted {
                    deleted_at: Utc::now(),
                },
            )
            .await?;
        Ok(!rows.is_empty())
    }
}

/// Strip characters that would break a PostgREST `or=(...)` group
fn sanitize_search(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"'))
        .collect::<String>()
        .trim()
        .to_string()
}
