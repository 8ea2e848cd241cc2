//! Listing creation and refresh, streamed step by step over SSE

use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{Complete, Disconnected, EventSink, Failure, Stage, WorkflowEvent};
use crate::clients::{ContentGenerator, ContentRequest, ListingDraft, ListingPlatform};
use crate::services::TokenProvider;
use crate::store::inventory::{InventoryItem, InventoryStatus, InventoryUpdate, ItemCondition, StatusChange};
use crate::store::listings::{Listing, ListingStage, ListingStatus, NewListing};
use crate::store::{InventoryStore, ListingStore, Platform};

pub const CREATE_STEPS: u8 = 4;
pub const REFRESH_STEPS: u8 = 3;
/// eBay "LEGO Complete Sets & Packs"
pub const DEFAULT_CATEGORY_ID: &str = "19006";
const CURRENCY: &str = "GBP";
const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateListingRequest {
    pub inventory_item_id: Uuid,
    pub price: f64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub category_id: Option<String>,
    pub notes: Option<String>,
}

impl CreateListingRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err("price must be greater than zero".to_string());
        }
        if self.image_urls.iter().all(|u| u.trim().is_empty()) {
            return Err("at least one image URL is required".to_string());
        }
        Ok(())
    }
}

/// A step that failed, and the listing row to mark when there is one
#[derive(Debug)]
struct StepError {
    stage: Stage,
    message: String,
    listing_id: Option<Uuid>,
}

impl StepError {
    fn new(stage: Stage, message: impl Display) -> Self {
        Self {
            stage,
            message: message.to_string(),
            listing_id: None,
        }
    }

    fn on(mut self, listing_id: Uuid) -> Self {
        self.listing_id = Some(listing_id);
        self
    }

    fn disconnected(stage: Stage) -> impl FnOnce(Disconnected) -> StepError {
        move |_| StepError::new(stage, "client disconnected")
    }
}

pub struct ListingWorkflow {
    inventory: InventoryStore,
    listings: ListingStore,
    platform: Arc<dyn ListingPlatform>,
    content: Arc<dyn ContentGenerator>,
    tokens: Arc<dyn TokenProvider>,
}

impl ListingWorkflow {
    pub fn new(
        inventory: InventoryStore,
        listings: ListingStore,
        platform: Arc<dyn ListingPlatform>,
        content: Arc<dyn ContentGenerator>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            inventory,
            listings,
            platform,
            content,
            tokens,
        }
    }

    /// Run the creation workflow in the background and hand back its event stream
    pub fn start_create(
        self: &Arc<Self>,
        user_id: Uuid,
        request: CreateListingRequest,
    ) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = EventSink::new(tx, CREATE_STEPS);
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            let result = workflow.create(user_id, &request, &sink).await;
            workflow.finish(user_id, result, &sink).await;
        });
        ReceiverStream::new(rx)
    }

    pub fn start_refresh(self: &Arc<Self>, user_id: Uuid, listing_id: Uuid) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = EventSink::new(tx, REFRESH_STEPS);
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            let result = workflow.refresh(user_id, listing_id, &sink).await;
            workflow.finish(user_id, result, &sink).await;
        });
        ReceiverStream::new(rx)
    }

    async fn finish(&self, user_id: Uuid, result: Result<Complete, StepError>, sink: &EventSink) {
        match result {
            Ok(complete) => {
                info!(
                    user_id = %user_id,
                    listing_id = %complete.listing_id,
                    external_listing_id = %complete.external_listing_id,
                    "Listing live"
                );
                let _ = sink.send(WorkflowEvent::Complete(complete)).await;
            }
            Err(failure) => {
                warn!(
                    user_id = %user_id,
                    listing_id = ?failure.listing_id,
                    stage = ?failure.stage,
                    error = %failure.message,
                    "Listing workflow failed"
                );
                if let Some(listing_id) = failure.listing_id {
                    if let Err(e) = self.listings.mark_failed(listing_id, &failure.message).await {
                        warn!(listing_id = %listing_id, error = %e, "Could not mark listing failed");
                    }
                }
                let _ = sink
                    .send(WorkflowEvent::Error(Failure {
                        stage: failure.stage,
                        message: failure.message,
                    }))
                    .await;
            }
        }
    }

    async fn create(
        &self,
        user_id: Uuid,
        request: &CreateListingRequest,
        sink: &EventSink,
    ) -> Result<Complete, StepError> {
        // 1. item + draft row
        sink.progress(1, Stage::Load, "Loading inventory item")
            .await
            .map_err(StepError::disconnected(Stage::Load))?;
        let item = self
            .inventory
            .get(user_id, request.inventory_item_id)
            .await
            .map_err(|e| StepError::new(Stage::Load, e))?
            .ok_or_else(|| StepError::new(Stage::Load, "Inventory item not found"))?;
        let sku = listing_sku(&item).map_err(|m| StepError::new(Stage::Load, m))?;
        if !item.status.can_transition_to(InventoryStatus::Listed) {
            return Err(StepError::new(
                Stage::Load,
                format!("Cannot list an item with status {}", item.status),
            ));
        }
        let listing = self
            .listings
            .create_draft(&NewListing {
                user_id,
                inventory_item_id: item.id,
                platform: Platform::Ebay,
                status: ListingStatus::Draft,
                price: request.price,
                image_urls: request.image_urls.clone(),
            })
            .await
            .map_err(|e| StepError::new(Stage::Load, e))?;
        let listing_id = listing.id;

        // 2. content
        let stage = Stage::Generate;
        sink.progress(2, stage, "Writing title and description")
            .await
            .map_err(|_| StepError::new(stage, "client disconnected").on(listing_id))?;
        self.set_stage(listing_id, ListingStage::status(ListingStatus::Generating), stage)
            .await?;
        let content = self
            .content
            .generate(&ContentRequest {
                set_number: item.set_number.clone(),
                item_name: item.item_name.clone(),
                condition: condition_label(item.condition).to_string(),
                notes: request.notes.clone(),
            })
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        self.set_stage(
            listing_id,
            ListingStage {
                title: Some(content.title.clone()),
                description: Some(content.description.clone()),
                ..Default::default()
            },
            stage,
        )
        .await?;

        // 3. images
        let stage = Stage::UploadImages;
        let sources: Vec<&str> = request
            .image_urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect();
        sink.progress(3, stage, format!("Uploading {} images", sources.len()))
            .await
            .map_err(|_| StepError::new(stage, "client disconnected").on(listing_id))?;
        self.set_stage(listing_id, ListingStage::status(ListingStatus::UploadingImages), stage)
            .await?;
        let token = self
            .tokens
            .access_token(user_id)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        let mut hosted = Vec::with_capacity(sources.len());
        for source in sources {
            let url = self
                .platform
                .upload_image(&token, source)
                .await
                .map_err(|e| StepError::new(stage, e).on(listing_id))?;
            hosted.push(url);
        }
        self.set_stage(
            listing_id,
            ListingStage {
                hosted_image_urls: Some(hosted.clone()),
                ..Default::default()
            },
            stage,
        )
        .await?;

        // 4. submit
        let stage = Stage::Submit;
        sink.progress(4, stage, "Submitting listing to eBay")
            .await
            .map_err(|_| StepError::new(stage, "client disconnected").on(listing_id))?;
        self.set_stage(listing_id, ListingStage::status(ListingStatus::Submitting), stage)
            .await?;
        let draft = ListingDraft {
            sku,
            title: content.title,
            description: content.description,
            condition: ebay_condition(item.condition).to_string(),
            category_id: request
                .category_id
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY_ID.to_string()),
            price: request.price,
            currency: CURRENCY.to_string(),
            image_urls: hosted,
        };
        let published = self
            .platform
            .submit_listing(&token, &draft)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        self.listings
            .mark_live(listing_id, &published.external_listing_id)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        self.mark_item_listed(user_id, &item, &published.external_listing_id, request.price)
            .await;

        Ok(Complete {
            listing_id,
            external_listing_id: published.external_listing_id,
            url: published.url,
        })
    }

    async fn refresh(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        sink: &EventSink,
    ) -> Result<Complete, StepError> {
        // 1. live listing
        let stage = Stage::Load;
        sink.progress(1, stage, "Loading listing")
            .await
            .map_err(StepError::disconnected(stage))?;
        let listing = self
            .listings
            .get(user_id, listing_id)
            .await
            .map_err(|e| StepError::new(stage, e))?
            .ok_or_else(|| StepError::new(stage, "Listing not found"))?;
        let live_external_id = match (&listing.status, &listing.external_listing_id) {
            (ListingStatus::Live, Some(id)) => id.clone(),
            _ => return Err(StepError::new(stage, "Only live listings can be refreshed")),
        };
        let item = match listing.inventory_item_id {
            Some(id) => self
                .inventory
                .get(user_id, id)
                .await
                .map_err(|e| StepError::new(stage, e))?,
            None => None,
        }
        .ok_or_else(|| StepError::new(stage, "Listing has no inventory item"))?;
        let sku = listing_sku(&item).map_err(|m| StepError::new(stage, m))?;
        let draft = refresh_draft(&listing, &item, sku).map_err(|m| StepError::new(stage, m))?;

        // 2. end
        let stage = Stage::End;
        sink.progress(2, stage, format!("Ending eBay listing {}", live_external_id))
            .await
            .map_err(StepError::disconnected(stage))?;
        let token = self
            .tokens
            .access_token(user_id)
            .await
            .map_err(|e| StepError::new(stage, e))?;
        self.platform
            .end_listing(&token, &draft.sku)
            .await
            .map_err(|e| StepError::new(stage, e))?;
        self.listings
            .mark_ended(listing_id)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;

        // 3. resubmit; the old listing is gone, so failures from here mark the row
        let stage = Stage::Resubmit;
        sink.progress(3, stage, "Resubmitting listing")
            .await
            .map_err(|_| StepError::new(stage, "client disconnected").on(listing_id))?;
        self.set_stage(listing_id, ListingStage::status(ListingStatus::Submitting), stage)
            .await?;
        let published = self
            .platform
            .submit_listing(&token, &draft)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        self.listings
            .mark_live(listing_id, &published.external_listing_id)
            .await
            .map_err(|e| StepError::new(stage, e).on(listing_id))?;
        self.mark_item_listed(user_id, &item, &published.external_listing_id, listing.price)
            .await;

        Ok(Complete {
            listing_id,
            external_listing_id: published.external_listing_id,
            url: published.url,
        })
    }

    async fn set_stage(&self, listing_id: Uuid, stage: ListingStage, step: Stage) -> Result<(), StepError> {
        self.listings
            .update_stage(listing_id, &stage)
            .await
            .map_err(|e| StepError::new(step, e).on(listing_id))
    }

    /// The listing is already live at this point, so inventory write failures are only logged
    async fn mark_item_listed(&self, user_id: Uuid, item: &InventoryItem, external_id: &str, price: f64) {
        let update = InventoryUpdate {
            ebay_listing_id: Some(external_id.to_string()),
            listing_platform: Some(Platform::Ebay.as_str().to_string()),
            listing_value: Some(price),
            ..Default::default()
        };
        if let Err(e) = self.inventory.update(user_id, item.id, &update).await {
            warn!(inventory_item_id = %item.id, error = %e, "Could not record eBay listing id");
        }

        if item.status != InventoryStatus::Listed {
            let change = StatusChange {
                status: InventoryStatus::Listed,
                sold_date: None,
                sold_price: None,
                updated_at: Utc::now(),
            };
            if let Err(e) = self.inventory.set_status(user_id, item.id, &change).await {
                warn!(inventory_item_id = %item.id, error = %e, "Could not mark item listed");
            }
        }
    }
}

fn listing_sku(item: &InventoryItem) -> Result<String, &'static str> {
    item.sku
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or("Inventory item has no SKU")
}

/// Rebuild the submission from what the live listing already holds
fn refresh_draft(listing: &Listing, item: &InventoryItem, sku: String) -> Result<ListingDraft, &'static str> {
    let title = listing.title.clone().ok_or("Listing has no title")?;
    let description = listing.description.clone().ok_or("Listing has no description")?;
    let image_urls = if listing.hosted_image_urls.is_empty() {
        listing.image_urls.clone()
    } else {
        listing.hosted_image_urls.clone()
    };
    Ok(ListingDraft {
        sku,
        title,
        description,
        condition: ebay_condition(item.condition).to_string(),
        category_id: DEFAULT_CATEGORY_ID.to_string(),
        price: listing.price,
        currency: CURRENCY.to_string(),
        image_urls,
    })
}

fn condition_label(condition: Option<ItemCondition>) -> &'static str {
    match condition {
        Some(ItemCondition::Used) => "Used",
        _ => "New",
    }
}

fn ebay_condition(condition: Option<ItemCondition>) -> &'static str {
    match condition {
        Some(ItemCondition::Used) => "USED_EXCELLENT",
        _ => "NEW",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ContentError, EbayError, ListingContent, PublishedListing};
    use crate::config::test_support::config_for;
    use crate::services::TokenError;
    use crate::store::SupabaseClient;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_stream::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct FakeEbay {
        calls: Mutex<Vec<String>>,
        reject_submit: bool,
    }

    #[async_trait]
    impl ListingPlatform for FakeEbay {
        async fn upload_image(&self, _token: &str, source_url: &str) -> Result<String, EbayError> {
            self.calls.lock().unwrap().push(format!("upload {}", source_url));
            Ok(format!("https://i.ebayimg.com/{}", source_url.len()))
        }

        async fn submit_listing(
            &self,
            _token: &str,
            draft: &ListingDraft,
        ) -> Result<PublishedListing, EbayError> {
            self.calls.lock().unwrap().push(format!("submit {}", draft.sku));
            if self.reject_submit {
                return Err(EbayError::Api {
                    status: 400,
                    body: "Listing violates policy".into(),
                });
            }
            Ok(PublishedListing {
                external_listing_id: "110099".into(),
                url: "https://www.ebay.co.uk/itm/110099".into(),
            })
        }

        async fn end_listing(&self, _token: &str, sku: &str) -> Result<(), EbayError> {
            self.calls.lock().unwrap().push(format!("end {}", sku));
            Ok(())
        }
    }

    struct FakeContent {
        fail: bool,
    }

    #[async_trait]
    impl ContentGenerator for FakeContent {
        async fn generate(&self, _request: &ContentRequest) -> Result<ListingContent, ContentError> {
            if self.fail {
                return Err(ContentError::Malformed);
            }
            Ok(ListingContent {
                title: "LEGO 10294 Titanic".into(),
                description: "<p>Sealed</p>".into(),
            })
        }
    }

    /// Client leaves while the title is being written
    struct DisconnectingContent {
        receiver: Mutex<Option<mpsc::Receiver<WorkflowEvent>>>,
    }

    #[async_trait]
    impl ContentGenerator for DisconnectingContent {
        async fn generate(&self, _request: &ContentRequest) -> Result<ListingContent, ContentError> {
            drop(self.receiver.lock().unwrap().take());
            Ok(ListingContent {
                title: "LEGO 10294 Titanic".into(),
                description: "<p>Sealed</p>".into(),
            })
        }
    }

    struct StaticToken;

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn access_token(&self, _user_id: Uuid) -> Result<String, TokenError> {
            Ok("token".into())
        }
    }

    fn item_json(id: Uuid, user_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "sku": "HB-0042",
            "set_number": "10294",
            "item_name": "Titanic",
            "condition": "New",
            "status": status,
            "cost": 450.0,
            "listing_value": null,
            "listing_platform": null,
            "storage_location": null,
            "purchase_id": null,
            "amazon_asin": null,
            "ebay_listing_id": null,
            "sold_date": null,
            "sold_price": null,
            "notes": null,
            "deleted_at": null,
            "created_at": "2026-08-01T00:00:00Z",
            "updated_at": null
        })
    }

    fn listing_json(id: Uuid, user_id: Uuid, item_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "inventory_item_id": item_id,
            "platform": "ebay",
            "status": status,
            "title": "LEGO 10294 Titanic",
            "description": "<p>Sealed</p>",
            "price": 629.99,
            "image_urls": ["https://cdn.example.com/a.jpg"],
            "hosted_image_urls": ["https://i.ebayimg.com/a"],
            "external_listing_id": "110001",
            "watch_count": 3,
            "listed_at": "2026-09-01T00:00:00Z",
            "error_message": null,
            "created_at": "2026-09-01T00:00:00Z",
            "updated_at": null
        })
    }

    fn workflow(server: &MockServer, ebay: Arc<FakeEbay>, fail_content: bool) -> Arc<ListingWorkflow> {
        let client = SupabaseClient::new(&config_for(&server.uri()));
        Arc::new(ListingWorkflow::new(
            InventoryStore::new(client.clone()),
            ListingStore::new(client),
            ebay,
            Arc::new(FakeContent { fail: fail_content }),
            Arc::new(StaticToken),
        ))
    }

    fn request(item_id: Uuid) -> CreateListingRequest {
        CreateListingRequest {
            inventory_item_id: item_id,
            price: 629.99,
            image_urls: vec!["https://cdn.example.com/a.jpg".into(), "https://cdn.example.com/bb.jpg".into()],
            category_id: None,
            notes: None,
        }
    }

    #[test]
    fn request_validation() {
        let mut req = request(Uuid::nil());
        assert!(req.validate().is_ok());
        req.price = 0.0;
        assert!(req.validate().is_err());
        req.price = 10.0;
        req.image_urls = vec![" ".into()];
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn create_streams_every_step_then_completes() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "BACKLOG")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/listings"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([listing_json(listing_id, user_id, item_id, "draft")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "live", "external_listing_id": "110099" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .and(body_partial_json(json!({ "status": "LISTED" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json(item_id, user_id, "LISTED")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json(item_id, user_id, "BACKLOG")])))
            .mount(&server)
            .await;

        let ebay = Arc::new(FakeEbay::default());
        let events: Vec<WorkflowEvent> = workflow(&server, ebay.clone(), false)
            .start_create(user_id, request(item_id))
            .collect()
            .await;

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["progress", "progress", "progress", "progress", "complete"]);
        assert_eq!(
            events.last(),
            Some(&WorkflowEvent::Complete(Complete {
                listing_id,
                external_listing_id: "110099".into(),
                url: "https://www.ebay.co.uk/itm/110099".into(),
            }))
        );
        assert_eq!(ebay.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn content_failure_marks_listing_failed_and_stops() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "BACKLOG")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/listings"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([listing_json(listing_id, user_id, item_id, "draft")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "failed" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let ebay = Arc::new(FakeEbay::default());
        let events: Vec<WorkflowEvent> = workflow(&server, ebay.clone(), true)
            .start_create(user_id, request(item_id))
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        match &events[2] {
            WorkflowEvent::Error(failure) => assert_eq!(failure.stage, Stage::Generate),
            other => panic!("expected an error event, got {:?}", other),
        }
        assert!(ebay.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sold_item_cannot_be_listed() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "SOLD")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let events: Vec<WorkflowEvent> = workflow(&server, Arc::new(FakeEbay::default()), false)
            .start_create(user_id, request(item_id))
            .collect()
            .await;
        assert_eq!(events.iter().map(|e| e.name()).collect::<Vec<_>>(), vec!["progress", "error"]);
    }

    #[tokio::test]
    async fn refresh_ends_then_resubmits() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(listing_id, user_id, item_id, "live")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "LISTED")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "live", "external_listing_id": "110099" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json(item_id, user_id, "LISTED")])))
            .mount(&server)
            .await;

        let ebay = Arc::new(FakeEbay::default());
        let events: Vec<WorkflowEvent> = workflow(&server, ebay.clone(), false)
            .start_refresh(user_id, listing_id)
            .collect()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[3].name(), "complete");
        assert_eq!(
            *ebay.calls.lock().unwrap(),
            vec!["end HB-0042".to_string(), "submit HB-0042".to_string()]
        );
    }

    #[tokio::test]
    async fn dropped_client_stops_before_touching_ebay() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "BACKLOG")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/listings"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([listing_json(listing_id, user_id, item_id, "draft")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "failed", "error_message": "client disconnected" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "uploading_images" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = EventSink::new(tx, CREATE_STEPS);
        let client = SupabaseClient::new(&config_for(&server.uri()));
        let ebay = Arc::new(FakeEbay::default());
        let workflow = ListingWorkflow::new(
            InventoryStore::new(client.clone()),
            ListingStore::new(client),
            ebay.clone(),
            Arc::new(DisconnectingContent {
                receiver: Mutex::new(Some(rx)),
            }),
            Arc::new(StaticToken),
        );

        let result = workflow.create(user_id, &request(item_id), &sink).await;
        let failure = result.as_ref().unwrap_err();
        assert_eq!(failure.stage, Stage::UploadImages);
        assert_eq!(failure.listing_id, Some(listing_id));
        workflow.finish(user_id, result, &sink).await;

        assert!(ebay.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_marks_listing_failed_when_resubmit_is_rejected() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(listing_id, user_id, item_id, "live")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json(item_id, user_id, "LISTED")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "ended" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "failed" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .and(body_partial_json(json!({ "status": "live" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let ebay = Arc::new(FakeEbay {
            reject_submit: true,
            ..Default::default()
        });
        let events: Vec<WorkflowEvent> = workflow(&server, ebay.clone(), false)
            .start_refresh(user_id, listing_id)
            .collect()
            .await;

        assert_eq!(
            events.iter().map(|e| e.name()).collect::<Vec<_>>(),
            vec!["progress", "progress", "progress", "error"]
        );
        match &events[3] {
            WorkflowEvent::Error(failure) => assert_eq!(failure.stage, Stage::Resubmit),
            other => panic!("expected an error event, got {:?}", other),
        }
        assert_eq!(
            *ebay.calls.lock().unwrap(),
            vec!["end HB-0042".to_string(), "submit HB-0042".to_string()]
        );
    }
}
