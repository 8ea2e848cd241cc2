//! Inventory/listing consistency checks

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::store::inventory::{InventoryItem, InventoryStatus};
use crate::store::listings::{Listing, ListingStatus};
use crate::store::supabase::SupabaseError;
use crate::store::{InventoryStore, ListingStore, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateSku,
    MissingSku,
    OrphanListing,
    SoldButListed,
    ListedWithoutListing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuIssue {
    pub kind: IssueKind,
    pub sku: Option<String>,
    pub inventory_item_ids: Vec<Uuid>,
    pub listing_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkuIssueReport {
    pub total: usize,
    pub counts: BTreeMap<IssueKind, usize>,
    pub issues: Vec<SkuIssue>,
}

impl SkuIssueReport {
    fn from_issues(issues: Vec<SkuIssue>) -> Self {
        let mut counts = BTreeMap::new();
        for issue in &issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        Self {
            total: issues.len(),
            counts,
            issues,
        }
    }
}

pub async fn scan(
    inventory: &InventoryStore,
    listings: &ListingStore,
    user_id: Uuid,
) -> Result<SkuIssueReport, SupabaseError> {
    let items = inventory.list_active(user_id).await?;
    let listings = listings.list_all(user_id).await?;
    Ok(SkuIssueReport::from_issues(detect(&items, &listings)))
}

/// `items` are the tenant's non-deleted inventory rows
pub fn detect(items: &[InventoryItem], listings: &[Listing]) -> Vec<SkuIssue> {
    let mut issues = Vec::new();
    let by_id: HashMap<Uuid, &InventoryItem> = items.iter().map(|i| (i.id, i)).collect();
    let live: Vec<&Listing> = listings
        .iter()
        .filter(|l| l.status == ListingStatus::Live)
        .collect();
    let live_items: HashSet<Uuid> = live.iter().filter_map(|l| l.inventory_item_id).collect();

    let mut by_sku: BTreeMap<&str, Vec<&InventoryItem>> = BTreeMap::new();
    for item in items.iter().filter(|i| i.status != InventoryStatus::Sold) {
        if let Some(sku) = clean_sku(item) {
            by_sku.entry(sku).or_default().push(item);
        }
    }
    for (sku, holders) in by_sku.into_iter().filter(|(_, h)| h.len() > 1) {
        issues.push(SkuIssue {
            kind: IssueKind::DuplicateSku,
            sku: Some(sku.to_string()),
            inventory_item_ids: holders.iter().map(|i| i.id).collect(),
            listing_id: None,
            message: format!("SKU {} is used by {} unsold items", sku, holders.len()),
        });
    }

    for item in items {
        if item.status == InventoryStatus::Listed && clean_sku(item).is_none() {
            issues.push(SkuIssue {
                kind: IssueKind::MissingSku,
                sku: None,
                inventory_item_ids: vec![item.id],
                listing_id: None,
                message: format!("{} is listed without a SKU", item.label()),
            });
        }

        if item.status == InventoryStatus::Listed
            && is_ebay(item)
            && item.ebay_listing_id.is_none()
            && !live_items.contains(&item.id)
        {
            issues.push(SkuIssue {
                kind: IssueKind::ListedWithoutListing,
                sku: item.sku.clone(),
                inventory_item_ids: vec![item.id],
                listing_id: None,
                message: format!("{} is marked listed on eBay but has no live listing", item.label()),
            });
        }
    }

    for listing in live {
        match listing.inventory_item_id.and_then(|id| by_id.get(&id)) {
            None => issues.push(SkuIssue {
                kind: IssueKind::OrphanListing,
                sku: None,
                inventory_item_ids: listing.inventory_item_id.into_iter().collect(),
                listing_id: Some(listing.id),
                message: "Live listing has no matching inventory item".to_string(),
            }),
            Some(item) if item.status == InventoryStatus::Sold => issues.push(SkuIssue {
                kind: IssueKind::SoldButListed,
                sku: item.sku.clone(),
                inventory_item_ids: vec![item.id],
                listing_id: Some(listing.id),
                message: format!("{} is sold but its listing is still live", item.label()),
            }),
            Some(_) => {}
        }
    }

    issues.sort_by_key(|issue| issue.kind);
    issues
}

fn clean_sku(item: &InventoryItem) -> Option<&str> {
    item.sku.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn is_ebay(item: &InventoryItem) -> bool {
    item.listing_platform
        .as_deref()
        .map(|p| p.eq_ignore_ascii_case(Platform::Ebay.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(status: InventoryStatus, sku: Option<&str>) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            sku: sku.map(str::to_string),
            set_number: Some("75192".into()),
            item_name: Some("Millennium Falcon".into()),
            condition: None,
            status,
            cost: Some(400.0),
            listing_value: None,
            listing_platform: None,
            storage_location: None,
            purchase_id: None,
            amazon_asin: None,
            ebay_listing_id: None,
            sold_date: None,
            sold_price: None,
            notes: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn live_listing(item_id: Option<Uuid>) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            inventory_item_id: item_id,
            platform: Platform::Ebay,
            status: ListingStatus::Live,
            title: None,
            description: None,
            price: 500.0,
            image_urls: vec![],
            hosted_image_urls: vec![],
            external_listing_id: Some("1234".into()),
            watch_count: 0,
            listed_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn kinds(issues: &[SkuIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn clean_inventory_has_no_issues() {
        let listed = item(InventoryStatus::Listed, Some("HB-1"));
        let listings = vec![live_listing(Some(listed.id))];
        assert!(detect(&[listed], &listings).is_empty());
    }

    #[test]
    fn duplicate_skus_ignore_sold_items() {
        let items = vec![
            item(InventoryStatus::Backlog, Some("HB-1")),
            item(InventoryStatus::Listed, Some(" HB-1 ")),
            item(InventoryStatus::Sold, Some("HB-2")),
            item(InventoryStatus::Backlog, Some("HB-2")),
        ];
        let issues = detect(&items, &[]);
        assert_eq!(kinds(&issues), vec![IssueKind::DuplicateSku]);
        assert_eq!(issues[0].sku.as_deref(), Some("HB-1"));
        assert_eq!(issues[0].inventory_item_ids.len(), 2);
    }

    #[test]
    fn listing_mismatches() {
        let sold = item(InventoryStatus::Sold, Some("HB-3"));
        let mut on_ebay = item(InventoryStatus::Listed, None);
        on_ebay.listing_platform = Some("eBay".into());

        let listings = vec![live_listing(Some(sold.id)), live_listing(Some(Uuid::new_v4()))];
        let issues = detect(&[sold, on_ebay], &listings);

        assert_eq!(
            kinds(&issues),
            vec![
                IssueKind::MissingSku,
                IssueKind::OrphanListing,
                IssueKind::SoldButListed,
                IssueKind::ListedWithoutListing,
            ]
        );
    }

    #[test]
    fn report_counts_by_kind() {
        let items = vec![item(InventoryStatus::Listed, None), item(InventoryStatus::Listed, Some(""))];
        let report = SkuIssueReport::from_issues(detect(&items, &[]));
        assert_eq!(report.total, 2);
        assert_eq!(report.counts.get(&IssueKind::MissingSku), Some(&2));
    }
}
