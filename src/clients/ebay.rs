//! eBay REST API client (OAuth, Fulfillment, Finances, Inventory, Media, Negotiation)

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{FeeSource, ListingDraft, ListingPlatform, PublishedListing};
use crate::config::Config;
use crate::util::rate_limit::OutboundLimiter;

const SELL_SCOPES: &str = "https://api.ebay.com/oauth/api_scope/sell.inventory \
https://api.ebay.com/oauth/api_scope/sell.fulfillment \
https://api.ebay.com/oauth/api_scope/sell.finances \
https://api.ebay.com/oauth/api_scope/sell.marketing";

/// eBay client shared by every tenant; callers pass the tenant's access token
#[derive(Clone)]
pub struct EbayClient {
    client: Client,
    base_url: String,
    marketplace_id: String,
    client_id: String,
    client_secret: String,
    limiter: OutboundLimiter,
}

impl EbayClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.ebay_api_base.trim_end_matches('/').to_string(),
            marketplace_id: config.ebay_marketplace_id.clone(),
            client_id: config.ebay_client_id.clone(),
            client_secret: config.ebay_client_secret.clone(),
            limiter: OutboundLimiter::new(config.ebay_requests_per_second),
        }
    }

    pub fn marketplace_id(&self) -> &str {
        &self.marketplace_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `base` plus percent-encoded path segments; SKUs may hold `/`, spaces or `#`
    fn path_url(&self, base: &str, segments: &[&str]) -> Result<Url, EbayError> {
        let mut url = Url::parse(&self.url(base)).map_err(|e| EbayError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| EbayError::InvalidUrl(self.base_url.clone()))?
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace_id)
            .header("Content-Language", "en-GB")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, EbayError> {
        self.limiter.acquire().await;
        let response = builder.send().await.map_err(EbayError::Request)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(EbayError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Exchange a refresh token for a fresh user access token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessToken, EbayError> {
        let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", SELL_SCOPES),
        ];

        let response = self
            .send(
                self.client
                    .post(self.url("/identity/v1/oauth2/token"))
                    .header("Authorization", format!("Basic {}", basic))
                    .form(&form),
            )
            .await?;

        let token: TokenResponse = response.json().await.map_err(EbayError::Parse)?;
        Ok(AccessToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// One page of orders created since `since`
    pub async fn get_orders(
        &self,
        token: &str,
        since: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<OrderPage, EbayError> {
        let filter = format!(
            "creationdate:[{}..]",
            since.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        );
        let response = self
            .send(
                self.authed(self.client.get(self.url("/sell/fulfillment/v1/order")), token)
                    .query(&[
                        ("filter", filter),
                        ("limit", limit.to_string()),
                        ("offset", offset.to_string()),
                    ]),
            )
            .await?;
        response.json().await.map_err(EbayError::Parse)
    }

    /// Sum of SALE transaction fees recorded against an order
    pub async fn get_order_fees(&self, token: &str, order_id: &str) -> Result<Option<f64>, EbayError> {
        let response = self
            .send(
                self.authed(
                    self.client.get(self.url("/sell/finances/v1/transaction")),
                    token,
                )
                .query(&[("filter", format!("orderId:{{{}}}", order_id))]),
            )
            .await?;
        let page: TransactionPage = response.json().await.map_err(EbayError::Parse)?;
        Ok(sum_sale_fees(&page.transactions))
    }

    async fn find_offer(&self, token: &str, sku: &str) -> Result<Option<Offer>, EbayError> {
        let result = self
            .send(
                self.authed(self.client.get(self.url("/sell/inventory/v1/offer")), token)
                    .query(&[("sku", sku)]),
            )
            .await;
        match result {
            Ok(response) => {
                let page: OfferPage = response.json().await.map_err(EbayError::Parse)?;
                Ok(page.offers.into_iter().next())
            }
            // eBay answers 404 when the SKU has no offers
            Err(EbayError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn send_offer_to_watchers(
        &self,
        token: &str,
        listing_id: &str,
        price: f64,
        currency: &str,
        message: &str,
    ) -> Result<(), EbayError> {
        let body = json!({
            "offeredItems": [{
                "listingId": listing_id,
                "price": { "value": format!("{:.2}", price), "currency": currency },
                "quantity": 1
            }],
            "allowCounterOffer": false,
            "message": message,
            "offerDuration": { "unit": "DAY", "value": 2 }
        });
        self.send(
            self.authed(
                self.client
                    .post(self.url("/sell/negotiation/v1/send_offer_to_interested_buyers")),
                token,
            )
            .json(&body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ListingPlatform for EbayClient {
    async fn upload_image(&self, token: &str, source_url: &str) -> Result<String, EbayError> {
        let created = self
            .send(
                self.authed(
                    self.client
                        .post(self.url("/commerce/media/v1_beta/image/create_image_from_url")),
                    token,
                )
                .json(&json!({ "imageUrl": source_url })),
            )
            .await?;

        let location = created
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(EbayError::MissingField("Location"))?;

        let location = if location.starts_with("http") {
            location
        } else {
            self.url(&location)
        };

        let image: HostedImage = self
            .send(self.authed(self.client.get(location), token))
            .await?
            .json()
            .await
            .map_err(EbayError::Parse)?;
        Ok(image.image_url)
    }

    async fn submit_listing(
        &self,
        token: &str,
        draft: &ListingDraft,
    ) -> Result<PublishedListing, EbayError> {
        let item = json!({
            "availability": { "shipToLocationAvailability": { "quantity": 1 } },
            "condition": draft.condition,
            "product": {
                "title": draft.title,
                "description": draft.description,
                "imageUrls": draft.image_urls,
            }
        });
        self.send(
            self.authed(
                self.client
                    .put(self.path_url("/sell/inventory/v1/inventory_item", &[draft.sku.as_str()])?),
                token,
            )
            .json(&item),
        )
        .await?;

        let mut offer = json!({
            "availableQuantity": 1,
            "categoryId": draft.category_id,
            "listingDescription": draft.description,
            "pricingSummary": {
                "price": { "value": format!("{:.2}", draft.price), "currency": draft.currency }
            }
        });
        let offer_id = match self.find_offer(token, &draft.sku).await? {
            // Left over from an earlier attempt; bring it in line with this draft
            Some(existing) => {
                self.send(
                    self.authed(
                        self.client
                            .put(self.path_url("/sell/inventory/v1/offer", &[existing.offer_id.as_str()])?),
                        token,
                    )
                    .json(&offer),
                )
                .await?;
                existing.offer_id
            }
            None => {
                offer["sku"] = json!(draft.sku);
                offer["marketplaceId"] = json!(self.marketplace_id);
                offer["format"] = json!("FIXED_PRICE");
                let created: CreatedOffer = self
                    .send(
                        self.authed(self.client.post(self.url("/sell/inventory/v1/offer")), token)
                            .json(&offer),
                    )
                    .await?
                    .json()
                    .await
                    .map_err(EbayError::Parse)?;
                created.offer_id
            }
        };

        let published: PublishResponse = self
            .send(self.authed(
                self.client
                    .post(self.path_url("/sell/inventory/v1/offer", &[offer_id.as_str(), "publish"])?),
                token,
            ))
            .await?
            .json()
            .await
            .map_err(EbayError::Parse)?;

        debug!(sku = %draft.sku, listing_id = %published.listing_id, "Offer published");

        Ok(PublishedListing {
            url: format!("https://www.ebay.co.uk/itm/{}", published.listing_id),
            external_listing_id: published.listing_id,
        })
    }

    async fn end_listing(&self, token: &str, sku: &str) -> Result<(), EbayError> {
        let offer = self
            .find_offer(token, sku)
            .await?
            .ok_or(EbayError::MissingField("offer"))?;
        self.send(self.authed(
            self.client
                .post(self.path_url("/sell/inventory/v1/offer", &[offer.offer_id.as_str(), "withdraw"])?),
            token,
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeeSource for EbayClient {
    async fn order_fees(&self, token: &str, order_id: &str) -> Result<Option<f64>, EbayError> {
        self.get_order_fees(token, order_id).await
    }
}

fn sum_sale_fees(transactions: &[Transaction]) -> Option<f64> {
    let fees: Vec<f64> = transactions
        .iter()
        .filter(|t| t.transaction_type == "SALE")
        .filter_map(|t| t.total_fee_amount.as_ref())
        .filter_map(|a| a.value.parse::<f64>().ok())
        .collect();
    if fees.is_empty() {
        None
    } else {
        Some(fees.iter().sum())
    }
}

/// User token with its computed expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

impl Amount {
    pub fn as_f64(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    #[serde(default)]
    pub orders: Vec<EbayOrder>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbayOrder {
    pub order_id: String,
    pub creation_date: DateTime<Utc>,
    pub order_fulfillment_status: Option<String>,
    pub buyer: Option<Buyer>,
    pub pricing_summary: Option<PricingSummary>,
    pub total_marketplace_fee: Option<Amount>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Buyer {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub price_subtotal: Option<Amount>,
    pub delivery_cost: Option<Amount>,
    pub total: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub line_item_id: String,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub quantity: i32,
    pub line_item_cost: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct TransactionPage {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Transaction {
    transaction_type: String,
    total_fee_amount: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct OfferPage {
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Offer {
    offer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOffer {
    offer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    listing_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostedImage {
    image_url: String,
}

/// eBay-related errors
#[derive(Debug, thiserror::Error)]
pub enum EbayError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("eBay API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse eBay response: {0}")]
    Parse(reqwest::Error),

    #[error("eBay response missing {0}")]
    MissingField(&'static str),

    #[error("Invalid eBay URL: {0}")]
    InvalidUrl(String),
}
