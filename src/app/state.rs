//! Application state shared across routes

use std::sync::Arc;

use crate::clients::{ContentClient, EbayClient};
use crate::config::Config;
use crate::listing::ListingWorkflow;
use crate::services::fees::FeeBackfill;
use crate::services::negotiation::NegotiationService;
use crate::services::reports::Reports;
use crate::services::sync::OrderSync;
use crate::services::{EbayTokens, TokenProvider};
use crate::store::{
    CredentialStore, InventoryStore, ListingStore, MarketStore, OrderStore, PredictionStore,
    PurchaseStore, SupabaseClient,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub inventory: InventoryStore,
    pub purchases: PurchaseStore,
    pub orders: OrderStore,
    pub listings: ListingStore,
    pub credentials: CredentialStore,
    pub market: MarketStore,
    pub predictions: PredictionStore,
    pub reports: Reports,
    pub workflow: Arc<ListingWorkflow>,
    pub negotiation: Arc<NegotiationService>,
    pub order_sync: Arc<OrderSync>,
    pub fee_backfill: Arc<FeeBackfill>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let supabase = SupabaseClient::new(&config);
        let inventory = InventoryStore::new(supabase.clone());
        let purchases = PurchaseStore::new(supabase.clone());
        let orders = OrderStore::new(supabase.clone());
        let listings = ListingStore::new(supabase.clone());
        let credentials = CredentialStore::new(supabase.clone());
        let market = MarketStore::new(supabase.clone());
        let predictions = PredictionStore::new(supabase);

        // One client so every eBay call shares the outbound rate limit
        let ebay = EbayClient::new(&config);
        let content = Arc::new(ContentClient::new(&config));
        let tokens: Arc<dyn TokenProvider> =
            Arc::new(EbayTokens::new(credentials.clone(), ebay.clone()));

        let reports = Reports::new(inventory.clone(), orders.clone(), purchases.clone());
        let workflow = Arc::new(ListingWorkflow::new(
            inventory.clone(),
            listings.clone(),
            Arc::new(ebay.clone()),
            content,
            tokens.clone(),
        ));
        let negotiation = Arc::new(NegotiationService::new(
            listings.clone(),
            inventory.clone(),
            ebay.clone(),
            tokens.clone(),
        ));
        let order_sync = Arc::new(OrderSync::new(
            credentials.clone(),
            orders.clone(),
            inventory.clone(),
            ebay.clone(),
            tokens.clone(),
            config.order_sync_days,
        ));
        let fee_backfill = Arc::new(FeeBackfill::new(orders.clone(), Arc::new(ebay), tokens));

        Self {
            config,
            inventory,
            purchases,
            orders,
            listings,
            credentials,
            market,
            predictions,
            reports,
            workflow,
            negotiation,
            order_sync,
            fee_backfill,
        }
    }
}
