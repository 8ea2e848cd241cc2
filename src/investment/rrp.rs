//! UK RRP backfill for active sets. Each fallback pass re-reads the missing
//! list so later passes only see what the earlier ones could not fill.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use super::stats::percentile;
use crate::store::market::{BricksetSet, MarketStore, PriceSnapshot, SeededAsinPrice};
use crate::store::supabase::SupabaseError;
use crate::util::time::round2;

pub const MIN_RRP_GBP: f64 = 5.0;
pub const UK_PER_US: f64 = 0.867;
pub const UK_PER_DE: f64 = 0.889;

const KEEPA_MIN_SNAPSHOTS: usize = 3;
const KEEPA_PERCENTILE: f64 = 95.0;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RrpBackfillReport {
    pub initial_missing: usize,
    pub amazon_fallback: usize,
    pub keepa_p95: usize,
    pub regional: usize,
    pub still_missing: usize,
}

pub fn amazon_candidates(prices: &[SeededAsinPrice]) -> BTreeMap<String, f64> {
    prices
        .iter()
        .filter_map(|p| {
            p.amazon_price
                .filter(|price| *price >= MIN_RRP_GBP)
                .map(|price| (p.set_number.clone(), price))
        })
        .collect()
}

/// 95th percentile of buy-box prices for sets with enough history
pub fn keepa_candidates(snapshots: &[PriceSnapshot]) -> BTreeMap<String, f64> {
    let mut by_set: HashMap<&str, Vec<f64>> = HashMap::new();
    for s in snapshots {
        if let Some(price) = s.price_gbp {
            by_set.entry(s.set_num.as_str()).or_default().push(price);
        }
    }
    by_set
        .into_iter()
        .filter(|(_, prices)| prices.len() >= KEEPA_MIN_SNAPSHOTS)
        .filter_map(|(set, prices)| {
            let p95 = percentile(&prices, KEEPA_PERCENTILE)?;
            (p95 >= MIN_RRP_GBP).then(|| (set.to_string(), round2(p95)))
        })
        .collect()
}

/// US price converted first, then DE
pub fn regional_candidate(set: &BricksetSet) -> Option<f64> {
    let converted = match (set.us_retail_price, set.de_retail_price) {
        (Some(us), _) if us >= MIN_RRP_GBP => round2(us * UK_PER_US),
        (_, Some(de)) if de >= MIN_RRP_GBP => round2(de * UK_PER_DE),
        _ => return None,
    };
    (converted >= MIN_RRP_GBP).then_some(converted)
}

fn numbers(sets: &[BricksetSet]) -> Vec<String> {
    sets.iter().map(|s| s.set_number.clone()).collect()
}

async fn apply(market: &MarketStore, prices: &BTreeMap<String, f64>) -> Result<usize, SupabaseError> {
    let mut updated = 0;
    for (set_number, price) in prices {
        if market.update_rrp(set_number, *price).await? {
            updated += 1;
        }
    }
    Ok(updated)
}

pub async fn backfill(market: &MarketStore) -> Result<RrpBackfillReport, SupabaseError> {
    let missing = market.sets_missing_rrp(MIN_RRP_GBP).await?;
    if missing.is_empty() {
        info!("No sets missing RRP");
        return Ok(RrpBackfillReport::default());
    }
    let mut report = RrpBackfillReport {
        initial_missing: missing.len(),
        ..Default::default()
    };

    let amazon = amazon_candidates(&market.amazon_prices_for_sets(&numbers(&missing)).await?);
    report.amazon_fallback = apply(market, &amazon).await?;

    let missing = market.sets_missing_rrp(MIN_RRP_GBP).await?;
    let keepa = keepa_candidates(&market.keepa_prices_for_sets(&numbers(&missing)).await?);
    report.keepa_p95 = apply(market, &keepa).await?;

    let missing = market.sets_missing_rrp(MIN_RRP_GBP).await?;
    let regional: BTreeMap<String, f64> = missing
        .iter()
        .filter_map(|s| regional_candidate(s).map(|p| (s.set_number.clone(), p)))
        .collect();
    report.regional = apply(market, &regional).await?;

    report.still_missing = market.sets_missing_rrp(MIN_RRP_GBP).await?.len();
    info!(
        initial = report.initial_missing,
        amazon = report.amazon_fallback,
        keepa = report.keepa_p95,
        regional = report.regional,
        still_missing = report.still_missing,
        "RRP backfill complete"
    );
    Ok(report)
}
