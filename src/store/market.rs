//! Catalogue and market price data (Brickset sets, price history, seeded ASIN prices)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::supabase::{Query, SupabaseClient, SupabaseError};

const SETS: &str = "brickset_sets";
const SNAPSHOTS: &str = "price_snapshots";
const ASIN_PRICING: &str = "seeded_asin_pricing";

/// Keep `in.(...)` lists short enough for URL limits
const SET_BATCH: usize = 100;
/// Each set can carry hundreds of snapshots
const SNAPSHOT_BATCH: usize = 20;

pub const KEEPA_BUYBOX_SOURCE: &str = "keepa_amazon_buybox";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BricksetSet {
    pub set_number: String,
    pub set_name: Option<String>,
    pub theme: Option<String>,
    pub pieces: Option<i32>,
    pub retirement_status: Option<String>,
    pub launch_date: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub uk_retail_price: Option<f64>,
    pub us_retail_price: Option<f64>,
    pub de_retail_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub set_num: String,
    pub date: NaiveDate,
    pub price_gbp: Option<f64>,
    pub seller_count: Option<i32>,
    pub buy_box_winner: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeededAsinPrice {
    pub set_number: String,
    pub amazon_price: Option<f64>,
}

#[derive(Clone)]
pub struct MarketStore {
    client: SupabaseClient,
}

impl MarketStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Retired sets old and expensive enough to train on
    pub async fn retired_sets_for_training(
        &self,
        min_exit_year: i32,
        min_rrp: f64,
    ) -> Result<Vec<BricksetSet>, SupabaseError> {
        let query = Query::new()
            .eq("retirement_status", "retired")
            .gte("exit_date", format!("{}-01-01", min_exit_year))
            .gte("uk_retail_price", min_rrp)
            .not_null("exit_date")
            .order("exit_date.asc");
        self.client.get_all(SETS, &query).await
    }

    /// Available or retiring sets whose UK RRP is null or below the floor
    pub async fn sets_missing_rrp(&self, min_rrp: f64) -> Result<Vec<BricksetSet>, SupabaseError> {
        let query = Query::new()
            .in_list("retirement_status", &["available", "retiring_soon"])
            .or(&format!(
                "uk_retail_price.is.null,uk_retail_price.lt.{}",
                min_rrp
            ))
            .order("set_number.asc");
        self.client.get_all(SETS, &query).await
    }

    /// Catalogue rows for the given set numbers
    pub async fn set_metadata(
        &self,
        set_numbers: &[String],
    ) -> Result<Vec<BricksetSet>, SupabaseError> {
        let mut sets = Vec::new();
        for batch in set_numbers.chunks(SET_BATCH) {
            let rows: Vec<BricksetSet> = self
                .client
                .get(SETS, &Query::new().in_list("set_number", batch))
                .await?;
            sets.extend(rows);
        }
        Ok(sets)
    }

    pub async fn update_rrp(&self, set_number: &str, price: f64) -> Result<bool, SupabaseError> {
        #[derive(Serialize)]
        struct Rrp {
            uk_retail_price: f64,
        }
        let rows: Vec<serde_json::Value> = self
            .client
            .update_returning(
                SETS,
                &Query::new().eq("set_number", set_number),
                &Rrp {
                    uk_retail_price: price,
                },
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Priced snapshots for the given sets, oldest first
    pub async fn snapshots_for_sets(
        &self,
        set_numbers: &[String],
    ) -> Result<Vec<PriceSnapshot>, SupabaseError> {
        let mut snapshots = Vec::new();
        for batch in set_numbers.chunks(SNAPSHOT_BATCH) {
            let query = Query::new()
                .in_list("set_num", batch)
                .not_null("price_gbp")
                .order("date.asc");
            let rows: Vec<PriceSnapshot> = self.client.get_all(SNAPSHOTS, &query).await?;
            snapshots.extend(rows);
        }
        Ok(snapshots)
    }

    /// Keepa buy-box prices below the £500 sentinel range
    pub async fn keepa_prices_for_sets(
        &self,
        set_numbers: &[String],
    ) -> Result<Vec<PriceSnapshot>, SupabaseError> {
        let mut snapshots = Vec::new();
        for batch in set_numbers.chunks(SNAPSHOT_BATCH) {
            let query = Query::new()
                .eq("source", KEEPA_BUYBOX_SOURCE)
                .gt("price_gbp", 0)
                .lt("price_gbp", 500)
                .in_list("set_num", batch)
                .order("set_num.asc");
            let rows: Vec<PriceSnapshot> = self.client.get_all(SNAPSHOTS, &query).await?;
            snapshots.extend(rows);
        }
        Ok(snapshots)
    }

    pub async fn amazon_prices_for_sets(
        &self,
        set_numbers: &[String],
    ) -> Result<Vec<SeededAsinPrice>, SupabaseError> {
        let mut prices = Vec::new();
        for batch in set_numbers.chunks(SET_BATCH) {
            let query = Query::new()
                .in_list("set_number", batch)
                .not_null("amazon_price")
                .select("set_number,amazon_price");
            let rows: Vec<SeededAsinPrice> = self.client.get(ASIN_PRICING, &query).await?;
            prices.extend(rows);
        }
        Ok(prices)
    }
}
