//! Training data for the appreciation models: milestone prices after retirement
//! and their log returns against RRP.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::info;

use super::stats::{median, percentile};
use super::Horizon;
use crate::store::market::{BricksetSet, MarketStore, PriceSnapshot};
use crate::store::predictions::{DataQuality, PredictionStore, TrainingRow};
use crate::store::supabase::SupabaseError;

pub const MIN_EXIT_YEAR: i32 = 2012;
pub const MIN_RRP_GBP: f64 = 5.0;
pub const MIN_SNAPSHOTS_PER_WINDOW: usize = 3;

const RETIREMENT_HALF_WIDTH: i64 = 15;
const HORIZON_HALF_WIDTH: i64 = 30;
const WINSOR_LOWER: f64 = 2.0;
const WINSOR_UPPER: f64 = 98.0;
const MIN_WINSOR_VALUES: usize = 10;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub sets: usize,
    pub rows: usize,
    pub good: usize,
    pub partial: usize,
    pub insufficient: usize,
    pub upserted: usize,
}

/// Median price inside `[centre - half, centre + half]` days from exit,
/// provided the window holds enough snapshots
pub fn milestone_price(
    snapshots: &[&PriceSnapshot],
    exit_date: NaiveDate,
    centre_days: i64,
    half_width: i64,
) -> Option<f64> {
    let start = exit_date + Duration::days(centre_days - half_width);
    let end = exit_date + Duration::days(centre_days + half_width);
    let prices: Vec<f64> = snapshots
        .iter()
        .filter(|s| s.date >= start && s.date <= end)
        .filter_map(|s| s.price_gbp)
        .collect();
    if prices.len() < MIN_SNAPSHOTS_PER_WINDOW {
        return None;
    }
    median(&prices)
}

fn log_return(price: Option<f64>, rrp: f64) -> Option<f64> {
    match price {
        Some(p) if p > 0.0 && rrp > 0.0 => Some((p / rrp).ln()),
        _ => None,
    }
}

pub fn quality(target_count: usize) -> DataQuality {
    match target_count {
        4 => DataQuality::Good,
        0 => DataQuality::Insufficient,
        _ => DataQuality::Partial,
    }
}

/// Training row for one set; `None` when the set has no exit date, RRP or snapshots
pub fn build_row(set: &BricksetSet, snapshots: &[&PriceSnapshot]) -> Option<TrainingRow> {
    let exit_date = set.exit_date?;
    let rrp = set.uk_retail_price?;
    if snapshots.is_empty() {
        return None;
    }

    let at = |h: Horizon| milestone_price(snapshots, exit_date, h.days(), HORIZON_HALF_WIDTH);
    let price_6m = at(Horizon::SixMonths);
    let price_1yr = at(Horizon::OneYear);
    let price_2yr = at(Horizon::TwoYears);
    let price_3yr = at(Horizon::ThreeYears);

    let target_6m = log_return(price_6m, rrp);
    let target_1yr = log_return(price_1yr, rrp);
    let target_2yr = log_return(price_2yr, rrp);
    let target_3yr = log_return(price_3yr, rrp);
    let targets = [target_6m, target_1yr, target_2yr, target_3yr]
        .iter()
        .filter(|t| t.is_some())
        .count();

    Some(TrainingRow {
        set_num: set.set_number.clone(),
        exit_date,
        rrp_gbp: rrp,
        price_at_retirement: milestone_price(snapshots, exit_date, 0, RETIREMENT_HALF_WIDTH),
        price_6m,
        price_1yr,
        price_2yr,
        price_3yr,
        target_6m,
        target_1yr,
        target_2yr,
        target_3yr,
        data_quality: quality(targets),
        snapshot_count: snapshots.len(),
    })
}

fn winsorise_column(rows: &mut [TrainingRow], column: fn(&mut TrainingRow) -> &mut Option<f64>) {
    let values: Vec<f64> = rows
        .iter_mut()
        .filter_map(|r| *column(r))
        .collect();
    if values.len() < MIN_WINSOR_VALUES {
        return;
    }
    let (Some(lower), Some(upper)) = (
        percentile(&values, WINSOR_LOWER),
        percentile(&values, WINSOR_UPPER),
    ) else {
        return;
    };
    for row in rows.iter_mut() {
        if let Some(v) = column(row) {
            *v = v.clamp(lower, upper);
        }
    }
}

/// Clip each target column to its 2nd..98th percentile
pub fn winsorise(rows: &mut [TrainingRow]) {
    winsorise_column(rows, |r| &mut r.target_6m);
    winsorise_column(rows, |r| &mut r.target_1yr);
    winsorise_column(rows, |r| &mut r.target_2yr);
    winsorise_column(rows, |r| &mut r.target_3yr);
}

/// Rows for every set with snapshots, targets winsorised
pub fn build_training_rows(sets: &[BricksetSet], snapshots: &[PriceSnapshot]) -> Vec<TrainingRow> {
    let mut by_set: HashMap<&str, Vec<&PriceSnapshot>> = HashMap::new();
    for snapshot in snapshots {
        by_set.entry(snapshot.set_num.as_str()).or_default().push(snapshot);
    }

    let mut rows: Vec<TrainingRow> = sets
        .iter()
        .filter_map(|set| {
            let snaps = by_set.get(set.set_number.as_str())?;
            build_row(set, snaps)
        })
        .collect();
    winsorise(&mut rows);
    rows
}

/// Rebuild `investment_training_data` from retired sets and their price history
pub async fn rebuild(
    market: &MarketStore,
    predictions: &PredictionStore,
) -> Result<TrainingSummary, SupabaseError> {
    let sets = market
        .retired_sets_for_training(MIN_EXIT_YEAR, MIN_RRP_GBP)
        .await?;
    let set_numbers: Vec<String> = sets.iter().map(|s| s.set_number.clone()).collect();
    let snapshots = market.snapshots_for_sets(&set_numbers).await?;
    info!(sets = sets.len(), snapshots = snapshots.len(), "Building training data");

    let rows = build_training_rows(&sets, &snapshots);
    let mut summary = TrainingSummary {
        sets: sets.len(),
        rows: rows.len(),
        ..Default::default()
    };
    for row in &rows {
        match row.data_quality {
            DataQuality::Good => summary.good += 1,
            DataQuality::Partial => summary.partial += 1,
            DataQuality::Insufficient => summary.insufficient += 1,
        }
    }

    let mut seen = HashSet::new();
    let usable: Vec<TrainingRow> = rows
        .into_iter()
        .filter(|r| r.data_quality != DataQuality::Insufficient)
        .filter(|r| seen.insert(r.set_num.clone()))
        .collect();
    summary.upserted = predictions.upsert_training_rows(&usable).await?;

    info!(
        good = summary.good,
        partial = summary.partial,
        insufficient = summary.insufficient,
        upserted = summary.upserted,
        "Training data rebuilt"
    );
    Ok(summary)
}
