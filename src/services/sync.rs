//! eBay order sync: pulls recent orders into platform_orders and marks stock sold

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ebay_auth::TokenProvider;
use super::ServiceError;
use crate::clients::ebay::{EbayOrder, LineItem};
use crate::clients::EbayClient;
use crate::store::inventory::{InventoryStatus, StatusChange};
use crate::store::orders::{NewOrder, NewOrderItem};
use crate::store::{CredentialStore, InventoryStore, OrderStore, Platform};

/// Fulfillment API maximum page size
pub const ORDER_PAGE_SIZE: usize = 200;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub users: usize,
    pub orders: usize,
    pub items_linked: usize,
    pub items_sold: usize,
    pub failed_users: usize,
}

pub struct OrderSync {
    credentials: CredentialStore,
    orders: OrderStore,
    inventory: InventoryStore,
    ebay: EbayClient,
    tokens: Arc<dyn TokenProvider>,
    days: i64,
}

impl OrderSync {
    pub fn new(
        credentials: CredentialStore,
        orders: OrderStore,
        inventory: InventoryStore,
        ebay: EbayClient,
        tokens: Arc<dyn TokenProvider>,
        days: i64,
    ) -> Self {
        Self {
            credentials,
            orders,
            inventory,
            ebay,
            tokens,
            days,
        }
    }

    /// Sync every tenant with an eBay connection; one tenant failing does not stop the rest
    pub async fn run(&self) -> Result<SyncReport, ServiceError> {
        let users = self.credentials.users_with_platform(Platform::Ebay).await?;
        let mut report = SyncReport::default();

        for user_id in users {
            report.users += 1;
            if let Err(e) = self.sync_user(user_id, &mut report).await {
                warn!(user_id = %user_id, error = %e, "eBay order sync failed");
                report.failed_users += 1;
            }
        }

        info!(
            users = report.users,
            orders = report.orders,
            items_sold = report.items_sold,
            failed_users = report.failed_users,
            "eBay order sync finished"
        );
        Ok(report)
    }

    pub async fn sync_user(&self, user_id: Uuid, report: &mut SyncReport) -> Result<(), ServiceError> {
        let token = self.tokens.access_token(user_id).await?;
        let since = Utc::now() - Duration::days(self.days);
        let mut offset = 0;

        loop {
            let page = self
                .ebay
                .get_orders(&token, since, offset, ORDER_PAGE_SIZE)
                .await?;
            let fetched = page.orders.len();

            for order in &page.orders {
                self.store_order(user_id, order, report).await?;
            }

            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }

        debug!(user_id = %user_id, "Orders synced");
        Ok(())
    }

    async fn store_order(
        &self,
        user_id: Uuid,
        order: &EbayOrder,
        report: &mut SyncReport,
    ) -> Result<(), ServiceError> {
        let linked = self
            .orders
            .existing_links(user_id, Platform::Ebay, &order.order_id)
            .await?;
        let mut items = Vec::with_capacity(order.line_items.len());
        let mut to_sell = Vec::new();

        for line in &order.line_items {
            let mut item = map_line_item(line);
            // A re-synced line keeps its stock link and is never sold twice
            if let Some(stock_id) = linked.get(&item.item_number) {
                item.inventory_item_id = Some(*stock_id);
            } else if let Some(sku) = line.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let matches = self.inventory.find_by_sku(user_id, sku).await?;
                // Prefer stock that is still for sale when a SKU was reused
                let matched = matches
                    .iter()
                    .find(|i| is_sellable(i.status))
                    .or_else(|| matches.first());
                if let Some(stock) = matched {
                    item.inventory_item_id = Some(stock.id);
                    report.items_linked += 1;
                    if is_sellable(stock.status) {
                        to_sell.push((stock.id, item.total_price));
                    }
                }
            }
            items.push(item);
        }

        self.orders
            .upsert_order(&map_order(user_id, order), &items)
            .await?;
        report.orders += 1;

        for (stock_id, price) in to_sell {
            let change = StatusChange {
                status: InventoryStatus::Sold,
                sold_date: Some(order.creation_date.date_naive()),
                sold_price: price,
                updated_at: Utc::now(),
            };
            if self
                .inventory
                .set_status(user_id, stock_id, &change)
                .await?
                .is_some()
            {
                report.items_sold += 1;
            }
        }
        Ok(())
    }
}

fn is_sellable(status: InventoryStatus) -> bool {
    matches!(status, InventoryStatus::Listed | InventoryStatus::Backlog)
}

pub fn map_order(user_id: Uuid, order: &EbayOrder) -> NewOrder {
    let pricing = order.pricing_summary.as_ref();
    let total = pricing.and_then(|p| p.total.as_ref());
    NewOrder {
        user_id,
        platform: Platform::Ebay,
        platform_order_id: order.order_id.clone(),
        order_date: order.creation_date,
        buyer_name: order.buyer.as_ref().and_then(|b| b.username.clone()),
        status: order.order_fulfillment_status.clone(),
        subtotal: pricing
            .and_then(|p| p.price_subtotal.as_ref())
            .and_then(|a| a.as_f64()),
        shipping: pricing
            .and_then(|p| p.delivery_cost.as_ref())
            .and_then(|a| a.as_f64()),
        fees: order.total_marketplace_fee.as_ref().and_then(|a| a.as_f64()),
        total: total.and_then(|a| a.as_f64()),
        currency: total.map(|a| a.currency.clone()),
    }
}

fn map_line_item(line: &LineItem) -> NewOrderItem {
    let total_price = line.line_item_cost.as_ref().and_then(|a| a.as_f64());
    let quantity = line.quantity.max(1);
    NewOrderItem {
        item_number: line.line_item_id.clone(),
        item_name: line.title.clone(),
        quantity,
        unit_price: total_price.map(|t| t / quantity as f64),
        total_price,
        inventory_item_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::config_for;
    use crate::services::ebay_auth::TokenError;
    use crate::store::SupabaseClient;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken;

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn access_token(&self, _user_id: Uuid) -> Result<String, TokenError> {
            Ok("token".into())
        }
    }

    fn ebay_order() -> serde_json::Value {
        json!({
            "orderId": "12-34567-89012",
            "creationDate": "2026-10-10T09:30:00.000Z",
            "orderFulfillmentStatus": "NOT_STARTED",
            "buyer": { "username": "brickfan" },
            "pricingSummary": {
                "priceSubtotal": { "value": "89.99", "currency": "GBP" },
                "deliveryCost": { "value": "4.50", "currency": "GBP" },
                "total": { "value": "94.49", "currency": "GBP" }
            },
            "totalMarketplaceFee": { "value": "12.40", "currency": "GBP" },
            "lineItems": [{
                "lineItemId": "10001",
                "sku": "HB-0042",
                "title": "LEGO 10294 Titanic",
                "quantity": 1,
                "lineItemCost": { "value": "89.99", "currency": "GBP" }
            }]
        })
    }

    #[test]
    fn maps_fulfillment_order() {
        let order: EbayOrder = serde_json::from_value(ebay_order()).unwrap();
        let mapped = map_order(Uuid::nil(), &order);
        assert_eq!(mapped.platform_order_id, "12-34567-89012");
        assert_eq!(mapped.buyer_name.as_deref(), Some("brickfan"));
        assert_eq!(mapped.fees, Some(12.40));
        assert_eq!(mapped.total, Some(94.49));
        assert_eq!(mapped.currency.as_deref(), Some("GBP"));

        let item = map_line_item(&order.line_items[0]);
        assert_eq!(item.item_number, "10001");
        assert_eq!(item.unit_price, Some(89.99));
    }

    fn stock_json(id: Uuid, user_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "sku": "HB-0042",
            "set_number": "10294",
            "item_name": "Titanic",
            "condition": "New",
            "status": status,
            "cost": 450.0,
            "listing_value": 629.99,
            "listing_platform": "ebay",
            "storage_location": null,
            "purchase_id": null,
            "amazon_asin": null,
            "ebay_listing_id": "2233",
            "sold_date": null,
            "sold_price": null,
            "notes": null,
            "deleted_at": null,
            "created_at": "2026-08-01T00:00:00Z",
            "updated_at": null
        })
    }

    fn order_row(order_id: Uuid, user_id: Uuid, items: serde_json::Value) -> serde_json::Value {
        json!({
            "id": order_id,
            "user_id": user_id,
            "platform": "ebay",
            "platform_order_id": "12-34567-89012",
            "order_date": "2026-10-10T09:30:00Z",
            "buyer_name": "brickfan",
            "status": "NOT_STARTED",
            "subtotal": 89.99,
            "shipping": 4.5,
            "fees": 12.4,
            "total": 94.49,
            "currency": "GBP",
            "created_at": null,
            "order_items": items
        })
    }

    /// Mounts the credential lookup, one order page and the order upsert
    async fn mount_common(server: &MockServer, user_id: Uuid, order_id: Uuid) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/platform_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": user_id }])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sell/fulfillment/v1/order"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orders": [ebay_order()],
                "total": 1
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/platform_orders"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([order_row(order_id, user_id, json!([]))])),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn order_sync(server: &MockServer) -> OrderSync {
        let config = config_for(&server.uri());
        let client = SupabaseClient::new(&config);
        OrderSync::new(
            CredentialStore::new(client.clone()),
            OrderStore::new(client.clone()),
            InventoryStore::new(client),
            EbayClient::new(&config),
            Arc::new(StaticToken),
            7,
        )
    }

    #[tokio::test]
    async fn listed_stock_is_linked_and_sold() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let stock_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        mount_common(&server, user_id, order_id).await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/platform_orders"))
            .respond_with(ResponseTemplate::new(406))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .and(query_param("sku", "eq.HB-0042"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([stock_json(stock_id, user_id, "LISTED")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/order_items"))
            .and(body_partial_json(json!([{ "inventory_item_id": stock_id }])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .and(body_partial_json(json!({
                "status": "SOLD",
                "sold_date": "2026-10-10",
                "sold_price": 89.99
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([stock_json(stock_id, user_id, "SOLD")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let report = order_sync(&server).run().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                users: 1,
                orders: 1,
                items_linked: 1,
                items_sold: 1,
                failed_users: 0,
            }
        );
    }

    #[tokio::test]
    async fn resync_keeps_existing_link_and_sells_nothing_more() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        let sold_unit = Uuid::new_v4();
        let spare_unit = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        mount_common(&server, user_id, order_id).await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/platform_orders"))
            .and(query_param("platform_order_id", "eq.12-34567-89012"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_row(
                order_id,
                user_id,
                json!([{
                    "id": Uuid::new_v4(),
                    "order_id": order_id,
                    "item_number": "10001",
                    "item_name": "LEGO 10294 Titanic",
                    "quantity": 1,
                    "unit_price": 89.99,
                    "total_price": 89.99,
                    "inventory_item_id": sold_unit
                }]),
            )))
            .mount(&server)
            .await;
        // The shared SKU still has a sellable unit, which must stay untouched
        Mock::given(method("GET"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                stock_json(sold_unit, user_id, "SOLD"),
                stock_json(spare_unit, user_id, "LISTED")
            ])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/order_items"))
            .and(body_partial_json(json!([{ "inventory_item_id": sold_unit }])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/inventory_items"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let report = order_sync(&server).run().await.unwrap();
        assert_eq!(report.orders, 1);
        assert_eq!(report.items_linked, 0);
        assert_eq!(report.items_sold, 0);
        assert_eq!(report.failed_users, 0);
    }
}
