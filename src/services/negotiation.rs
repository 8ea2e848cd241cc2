//! Offers to watchers of stale eBay listings

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::ebay_auth::TokenProvider;
use super::fees::estimate_fee;
use super::ServiceError;
use crate::clients::EbayClient;
use crate::store::listings::Listing;
use crate::store::{InventoryStore, ListingStore, Platform};
use crate::util::time::days_between;

pub const MIN_DAYS_LISTED: i64 = 14;
pub const MAX_DISCOUNT_PERCENT: u32 = 25;
pub const MIN_DISCOUNT_PERCENT: u32 = 5;
/// Offers must clear cost plus this margin, after fees
pub const FLOOR_MARGIN: f64 = 1.10;
const BUSY_WATCHERS: i32 = 5;
const OFFER_MESSAGE: &str = "Thanks for watching! Here's a discount if you'd like it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoWatchers,
    TooRecent,
    BelowFloor,
    NotOnEbay,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Offer { discount_percent: u32, offer_price: f64 },
    Skip { reason: SkipReason },
}

/// Discount tier from listing age, with a bump for busy listings
pub fn tier_discount(days_listed: i64, watchers: i32) -> Option<u32> {
    let base = match days_listed {
        d if d >= 60 => 20,
        d if d >= 30 => 15,
        d if d >= MIN_DAYS_LISTED => 10,
        _ => return None,
    };
    let bump = if watchers >= BUSY_WATCHERS { 5 } else { 0 };
    Some((base + bump).min(MAX_DISCOUNT_PERCENT))
}

/// `price` less `discount_percent`, rounded down to the penny
pub fn discounted_price(price: f64, discount_percent: u32) -> f64 {
    let pennies = (price * 100.0).round() as i64;
    let offered = pennies * (100 - discount_percent as i64) / 100;
    offered as f64 / 100.0
}

/// Lowest acceptable offer: cost plus margin plus the eBay fee on the offer itself
pub fn price_floor(cost: Option<f64>, offer_price: f64) -> f64 {
    cost.unwrap_or(0.0) * FLOOR_MARGIN + estimate_fee(Platform::Ebay, offer_price)
}

pub fn decide(price: f64, cost: Option<f64>, days_listed: i64, watchers: i32) -> Decision {
    if watchers <= 0 {
        return Decision::Skip {
            reason: SkipReason::NoWatchers,
        };
    }
    let Some(tier) = tier_discount(days_listed, watchers) else {
        return Decision::Skip {
            reason: SkipReason::TooRecent,
        };
    };

    (MIN_DISCOUNT_PERCENT..=tier)
        .rev()
        .map(|discount| (discount, discounted_price(price, discount)))
        .find(|(_, offer)| *offer > price_floor(cost, *offer))
        .map(|(discount_percent, offer_price)| Decision::Offer {
            discount_percent,
            offer_price,
        })
        .unwrap_or(Decision::Skip {
            reason: SkipReason::BelowFloor,
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferPreview {
    pub listing_id: Uuid,
    pub external_listing_id: Option<String>,
    pub title: Option<String>,
    pub price: f64,
    pub days_listed: i64,
    pub watchers: i32,
    #[serde(flatten)]
    pub decision: Decision,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SendReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct NegotiationService {
    listings: ListingStore,
    inventory: InventoryStore,
    ebay: EbayClient,
    tokens: Arc<dyn TokenProvider>,
}

impl NegotiationService {
    pub fn new(
        listings: ListingStore,
        inventory: InventoryStore,
        ebay: EbayClient,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            listings,
            inventory,
            ebay,
            tokens,
        }
    }

    pub async fn preview(&self, user_id: Uuid) -> Result<Vec<OfferPreview>, ServiceError> {
        let live = self.listings.list_live(user_id, Platform::Ebay).await?;
        let costs: HashMap<Uuid, Option<f64>> = self
            .inventory
            .list_active(user_id)
            .await?
            .into_iter()
            .map(|item| (item.id, item.cost))
            .collect();

        let now = Utc::now();
        Ok(live
            .iter()
            .map(|listing| preview_listing(listing, &costs, now))
            .collect())
    }

    pub async fn send(&self, user_id: Uuid) -> Result<SendReport, ServiceError> {
        let previews = self.preview(user_id).await?;
        let mut report = SendReport::default();
        if previews.is_empty() {
            return Ok(report);
        }
        let token = self.tokens.access_token(user_id).await?;

        for preview in previews {
            let (Decision::Offer { offer_price, .. }, Some(external_id)) =
                (preview.decision, preview.external_listing_id.as_deref())
            else {
                report.skipped += 1;
                continue;
            };

            match self
                .ebay
                .send_offer_to_watchers(&token, external_id, offer_price, "GBP", OFFER_MESSAGE)
                .await
            {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(listing_id = %preview.listing_id, error = %e, "Offer send failed");
                    report.failed += 1;
                }
            }
        }

        info!(user_id = %user_id, sent = report.sent, skipped = report.skipped, "Watcher offers sent");
        Ok(report)
    }
}

fn preview_listing(
    listing: &Listing,
    costs: &HashMap<Uuid, Option<f64>>,
    now: DateTime<Utc>,
) -> OfferPreview {
    let listed_at = listing.listed_at.unwrap_or(listing.created_at);
    let days_listed = days_between(listed_at, now);
    let cost = listing
        .inventory_item_id
        .and_then(|id| costs.get(&id).copied().flatten());

    let decision = if listing.external_listing_id.is_none() {
        Decision::Skip {
            reason: SkipReason::NotOnEbay,
        }
    } else {
        decide(listing.price, cost, days_listed, listing.watch_count)
    };

    OfferPreview {
        listing_id: listing.id,
        external_listing_id: listing.external_listing_id.clone(),
        title: listing.title.clone(),
        price: listing.price,
        days_listed,
        watchers: listing.watch_count,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_by_age_and_watchers() {
        assert_eq!(tier_discount(13, 3), None);
        assert_eq!(tier_discount(14, 1), Some(10));
        assert_eq!(tier_discount(30, 1), Some(15));
        assert_eq!(tier_discount(90, 1), Some(20));
        assert_eq!(tier_discount(90, 8), Some(25));
        assert_eq!(tier_discount(20, 5), Some(15));
    }

    #[test]
    fn discount_rounds_down_to_penny() {
        assert_eq!(discounted_price(49.99, 10), 44.99);
        assert_eq!(discounted_price(10.0, 15), 8.5);
    }

    #[test]
    fn generous_margin_gets_full_tier() {
        let decision = decide(100.0, Some(40.0), 45, 2);
        assert_eq!(
            decision,
            Decision::Offer {
                discount_percent: 15,
                offer_price: 85.0
            }
        );
    }

    #[test]
    fn tight_margin_lowers_discount() {
        // 12% off: 88.00 against a floor of 77 + 11.56
        // 11% off: 89.00 against a floor of 77 + 11.69
        assert_eq!(
            decide(100.0, Some(70.0), 45, 2),
            Decision::Offer {
                discount_percent: 11,
                offer_price: 89.0
            }
        );
    }

    #[test]
    fn offer_at_the_floor_is_not_enough() {
        // 15% off is 0.34, exactly the 0.34 fee; 12% off is the first price strictly above it
        assert_eq!(price_floor(Some(0.0), 0.34), 0.34);
        assert_eq!(
            decide(0.40, Some(0.0), 45, 2),
            Decision::Offer {
                discount_percent: 12,
                offer_price: 0.35
            }
        );
    }

    #[test]
    fn skips() {
        assert_eq!(
            decide(100.0, Some(10.0), 60, 0),
            Decision::Skip { reason: SkipReason::NoWatchers }
        );
        assert_eq!(
            decide(100.0, Some(10.0), 3, 4),
            Decision::Skip { reason: SkipReason::TooRecent }
        );
        assert_eq!(
            decide(100.0, Some(90.0), 60, 4),
            Decision::Skip { reason: SkipReason::BelowFloor }
        );
    }
}
