//! Marketplace orders and their line items

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::platform::Platform;
use super::supabase::{Page, Query, SupabaseClient, SupabaseError};

const ORDERS: &str = "platform_orders";
const ITEMS: &str = "order_items";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: Platform,
    pub platform_order_id: String,
    pub order_date: DateTime<Utc>,
    pub buyer_name: Option<String>,
    pub status: Option<String>,
    pub subtotal: Option<f64>,
    pub shipping: Option<f64>,
    pub fees: Option<f64>,
    #[serde(default)]
    pub fees_estimated: bool,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_number: String,
    pub item_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub inventory_item_id: Option<Uuid>,
}

/// Order row with its embedded items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: PlatformOrder,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

/// Order as mapped from a marketplace, keyed by (user, platform, platform_order_id)
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub platform: Platform,
    pub platform_order_id: String,
    pub order_date: DateTime<Utc>,
    pub buyer_name: Option<String>,
    pub status: Option<String>,
    pub subtotal: Option<f64>,
    pub shipping: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<f64>,
    pub total: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewOrderItem {
    pub item_number: String,
    pub item_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub inventory_item_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct OrderStore {
    client: SupabaseClient,
}

impl OrderStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        platform: Option<Platform>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlatformOrder>, SupabaseError> {
        let mut query = Query::new().eq("user_id", user_id);
        if let Some(platform) = platform {
            query = query.eq("platform", platform);
        }
        self.client
            .get_page(ORDERS, &query.order("order_date.desc"), offset, limit)
            .await
    }

    pub async fn get_with_items(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OrderWithItems>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("id", id)
            .select("*,order_items(*)");
        self.client.get_one(ORDERS, &query).await
    }

    /// Inventory links already stored for a marketplace order, keyed by item number
    pub async fn existing_links(
        &self,
        user_id: Uuid,
        platform: Platform,
        platform_order_id: &str,
    ) -> Result<HashMap<String, Uuid>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("platform", platform)
            .eq("platform_order_id", platform_order_id)
            .select("*,order_items(*)");
        let order: Option<OrderWithItems> = self.client.get_one(ORDERS, &query).await?;
        Ok(order
            .map(|o| o.order_items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| Some((item.item_number, item.inventory_item_id?)))
            .collect())
    }

    /// Orders with items placed in `[from, to)`
    pub async fn list_in_range(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OrderWithItems>, SupabaseError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .gte("order_date", from.to_rfc3339())
            .lt("order_date", to.to_rfc3339())
            .select("*,order_items(*)")
            .order("order_date.asc");
        self.client.get_all(ORDERS, &query).await
    }

    /// Insert or refresh an order, then its items
    pub async fn upsert_order(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<PlatformOrder, SupabaseError> {
        let stored: Vec<PlatformOrder> = self
            .client
            .upsert(
                ORDERS,
                std::slice::from_ref(order),
                "user_id,platform,platform_order_id",
            )
            .await?;
        let stored = stored
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)?;

        if !items.is_empty() {
            #[derive(Serialize)]
            struct Keyed<'a> {
                order_id: Uuid,
                #[serde(flatten)]
                item: &'a NewOrderItem,
            }
            let rows: Vec<Keyed<'_>> = items
                .iter()
                .map(|item| Keyed {
                    order_id: stored.id,
                    item,
                })
                .collect();
            let _: Vec<OrderItem> = self
                .client
                .upsert(ITEMS, &rows, "order_id,item_number")
                .await?;
        }

        Ok(stored)
    }

    /// Oldest orders still lacking fee data, across all tenants (cron use)
    pub async fn list_missing_fees(&self, limit: usize) -> Result<Vec<PlatformOrder>, SupabaseError> {
        let query = Query::new()
            .is_null("fees")
            .order("order_date.asc")
            .limit(limit);
        self.client.get(ORDERS, &query).await
    }

    pub async fn set_fees(
        &self,
        order_id: Uuid,
        fees: f64,
        estimated: bool,
    ) -> Result<(), SupabaseError> {
        #[derive(Serialize)]
        struct Fees {
            fees: f64,
            fees_estimated: bool,
        }
        self.client
            .update(
                ORDERS,
                &Query::new().eq("id", order_id),
                &Fees {
                    fees,
                    fees_estimated: estimated,
                },
            )
            .await
    }
}
