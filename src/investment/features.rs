//! Price trajectory features derived from a set's snapshot history

use chrono::Duration;
use serde_json::{json, Map, Value};

use super::stats::{index_slope, mean, sample_std};
use crate::store::market::PriceSnapshot;
use crate::util::time::round_to;

const MOMENTUM_DAYS: i64 = 90;
const VOLATILITY_DAYS: i64 = 180;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TrajectoryFeatures {
    pub discount_at_retirement: Option<f64>,
    pub price_momentum_90d: Option<f64>,
    pub price_volatility_180d: Option<f64>,
    pub seller_count_at_retirement: Option<f64>,
    pub buy_box_is_amazon: Option<f64>,
}

/// Prices dated within `days` of the newest snapshot
fn recent_prices(snapshots: &[&PriceSnapshot], days: i64) -> Vec<f64> {
    let Some(latest) = snapshots.iter().map(|s| s.date).max() else {
        return Vec::new();
    };
    let cutoff = latest - Duration::days(days);
    snapshots
        .iter()
        .filter(|s| s.date >= cutoff)
        .filter_map(|s| s.price_gbp)
        .collect()
}

/// `snapshots` must be sorted oldest first
pub fn trajectory(rrp: Option<f64>, snapshots: &[&PriceSnapshot]) -> TrajectoryFeatures {
    let mut features = TrajectoryFeatures::default();
    // A set with no priced snapshot gets no features at all
    let Some(latest) = snapshots.iter().rev().find_map(|s| s.price_gbp) else {
        return features;
    };

    if let Some(rrp) = rrp {
        if rrp > 0.0 {
            features.discount_at_retirement = Some((rrp - latest) / rrp);
        }
    }

    let recent = recent_prices(snapshots, MOMENTUM_DAYS);
    if recent.len() >= 2 {
        let m = mean(&recent).unwrap_or(0.0);
        features.price_momentum_90d = match index_slope(&recent) {
            Some(slope) if m > 0.0 => Some(slope / m),
            _ => Some(0.0),
        };
    }

    let window = recent_prices(snapshots, VOLATILITY_DAYS);
    if window.len() >= 2 {
        if let (Some(std), Some(m)) = (sample_std(&window), mean(&window)) {
            features.price_volatility_180d = Some(if m > 0.0 { std / m } else { 0.0 });
        }
    }

    features.seller_count_at_retirement = snapshots
        .iter()
        .rev()
        .find_map(|s| s.seller_count)
        .map(f64::from);

    features.buy_box_is_amazon = snapshots
        .iter()
        .rev()
        .find_map(|s| s.buy_box_winner.as_deref())
        .map(|winner| {
            if winner.to_lowercase().contains("amazon") {
                1.0
            } else {
                0.0
            }
        });

    features
}

impl TrajectoryFeatures {
    /// `{"trajectory": {...}}` with values rounded to 4 dp, absent features omitted; `{}` when none
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        let fields = [
            ("discount_at_retirement", self.discount_at_retirement),
            ("price_momentum_90d", self.price_momentum_90d),
            ("price_volatility_180d", self.price_volatility_180d),
            ("seller_count_at_retirement", self.seller_count_at_retirement),
            ("buy_box_is_amazon", self.buy_box_is_amazon),
        ];
        for (name, value) in fields {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                map.insert(name.to_string(), json!(round_to(v, 4)));
            }
        }
        if map.is_empty() {
            return json!({});
        }
        json!({ "trajectory": map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snap(day: u32, price: f64) -> PriceSnapshot {
        PriceSnapshot {
            set_num: "42100".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            price_gbp: Some(price),
            seller_count: Some(day as i32),
            buy_box_winner: Some("Amazon.co.uk".into()),
            source: None,
        }
    }

    #[test]
    fn rising_prices() {
        let snaps = vec![snap(1, 80.0), snap(2, 90.0), snap(3, 100.0)];
        let refs: Vec<&PriceSnapshot> = snaps.iter().collect();
        let f = trajectory(Some(125.0), &refs);
        assert_eq!(f.discount_at_retirement, Some(0.2));
        // slope 10 over mean 90
        assert!((f.price_momentum_90d.unwrap() - 10.0 / 90.0).abs() < 1e-12);
        assert!((f.price_volatility_180d.unwrap() - 10.0 / 90.0).abs() < 1e-12);
        assert_eq!(f.seller_count_at_retirement, Some(3.0));
        assert_eq!(f.buy_box_is_amazon, Some(1.0));

        let json = f.to_json();
        assert_eq!(json["trajectory"]["discount_at_retirement"], json!(0.2));
        assert_eq!(json["trajectory"]["price_momentum_90d"], json!(0.1111));
    }

    #[test]
    fn single_snapshot_has_no_trend() {
        let snaps = vec![snap(5, 50.0)];
        let refs: Vec<&PriceSnapshot> = snaps.iter().collect();
        let f = trajectory(None, &refs);
        assert_eq!(f.discount_at_retirement, None);
        assert_eq!(f.price_momentum_90d, None);
        assert_eq!(f.price_volatility_180d, None);
        assert!(f.to_json()["trajectory"].get("price_momentum_90d").is_none());
    }

    #[test]
    fn empty_history() {
        assert_eq!(trajectory(Some(10.0), &[]), TrajectoryFeatures::default());
        assert_eq!(TrajectoryFeatures::default().to_json(), json!({}));
    }

    #[test]
    fn unpriced_history_yields_nothing() {
        let mut snaps = vec![snap(1, 0.0), snap(2, 0.0)];
        for s in &mut snaps {
            s.price_gbp = None;
        }
        let refs: Vec<&PriceSnapshot> = snaps.iter().collect();
        let f = trajectory(Some(100.0), &refs);
        assert_eq!(f, TrajectoryFeatures::default());
        assert_eq!(f.to_json(), json!({}));
    }

    #[test]
    fn zero_mean_prices_have_zero_volatility() {
        let snaps = vec![snap(1, 0.0), snap(2, 0.0), snap(3, 0.0)];
        let refs: Vec<&PriceSnapshot> = snaps.iter().collect();
        let f = trajectory(None, &refs);
        assert_eq!(f.price_volatility_180d, Some(0.0));
        assert_eq!(f.price_momentum_90d, Some(0.0));
    }
}
