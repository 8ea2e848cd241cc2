//! Marketplace listings created by the listing workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::platform::Platform;
use super::supabase::{Page, Query, SupabaseClient, SupabaseError};

const TABLE: &str = "listings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Generating,
    UploadingImages,
    Submitting,
    Live,
    Failed,
    Ended,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Generating => "generating",
            ListingStatus::UploadingImages => "uploading_images",
            ListingStatus::Submitting => "submitting",
            ListingStatus::Live => "live",
            ListingStatus::Failed => "failed",
            ListingStatus::Ended => "ended",
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inventory_item_id: Option<Uuid>,
    pub platform: Platform,
    pub status: ListingStatus,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub hosted_image_urls: Vec<String>,
    pub external_listing_id: Option<String>,
    #[serde(default)]
    pub watch_count: i32,
    pub listed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewListing {
    pub user_id: Uuid,
    pub inventory_item_id: Uuid,
    pub platform: Platform,
    pub status: ListingStatus,
    pub price: f64,
    pub image_urls: Vec<String>,
}

/// Fields written as the workflow advances
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListingStage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ListingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_image_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_listing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ListingStage {
    pub fn status(status: ListingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct ListingStore {
    client: SupabaseClient,
}

impl ListingStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        status: Option<ListingStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Listing>, SupabaseError> {
        let mut query = Query::new().eq("user_id", user_id);
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        self.client
            .get_page(TABLE, &query.order("created_at.desc"), offset, limit)
            .await
    }

    pub async fn list_live(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Vec<Listing>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("platform", platform)
            .eq("status", ListingStatus::Live);
        self.client.get_all(TABLE, &query).await
    }

    pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<Listing>, SupabaseError> {
        self.client
            .get_all(TABLE, &Query::new().eq("user_id", user_id))
            .await
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Listing>, SupabaseError> {
        self.client
            .get_one(TABLE, &Query::new().eq("user_id", user_id).eq("id", id))
            .await
    }

    pub async fn create_draft(&self, listing: &NewListing) -> Result<Listing, SupabaseError> {
        self.client.insert(TABLE, listing).await
    }

    pub async fn update_stage(&self, id: Uuid, stage: &ListingStage) -> Result<(), SupabaseError> {
        #[derive(Serialize)]
        struct Stamped<'a> {
            #[serde(flatten)]
            stage: &'a ListingStage,
            updated_at: DateTime<Utc>,
        }
        self.client
            .update(
                TABLE,
                &Query::new().eq("id", id),
                &Stamped {
                    stage,
                    updated_at: Utc::now(),
                },
            )
            .await
    }

    pub async fn mark_live(&self, id: Uuid, external_listing_id: &str) -> Result<(), SupabaseError> {
        self.update_stage(
            id,
            &ListingStage {
                status: Some(ListingStatus::Live),
                external_listing_id: Some(external_listing_id.to_string()),
                listed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), SupabaseError> {
        self.update_stage(
            id,
            &ListingStage {
                status: Some(ListingStatus::Failed),
                error_message: Some(message.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_ended(&self, id: Uuid) -> Result<(), SupabaseError> {
        self.update_stage(id, &ListingStage::status(ListingStatus::Ended))
            .await
    }
}
