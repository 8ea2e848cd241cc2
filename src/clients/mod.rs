//! External marketplace and content API clients
//!
//! The traits here are the seams the workflows are written against, so the
//! listing and fee flows can run against in-memory fakes.

pub mod content;
pub mod ebay;

use async_trait::async_trait;

pub use content::{ContentClient, ContentError};
pub use ebay::{EbayClient, EbayError};

/// Everything the marketplace needs to publish one item
#[derive(Debug, Clone)]
pub struct ListingDraft {
    pub sku: String,
    pub title: String,
    pub description: String,
    pub condition: String,
    pub category_id: String,
    pub price: f64,
    pub currency: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PublishedListing {
    pub external_listing_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ContentRequest {
    pub set_number: Option<String>,
    pub item_name: Option<String>,
    pub condition: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListingContent {
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait ListingPlatform: Send + Sync {
    /// Copy an image into marketplace hosting and return the hosted URL
    async fn upload_image(&self, token: &str, source_url: &str) -> Result<String, EbayError>;

    async fn submit_listing(
        &self,
        token: &str,
        draft: &ListingDraft,
    ) -> Result<PublishedListing, EbayError>;

    async fn end_listing(&self, token: &str, sku: &str) -> Result<(), EbayError>;
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &ContentRequest) -> Result<ListingContent, ContentError>;
}

#[async_trait]
pub trait FeeSource: Send + Sync {
    /// Fees the marketplace actually charged, if it has recorded any yet
    async fn order_fees(&self, token: &str, order_id: &str) -> Result<Option<f64>, EbayError>;
}
