//! Turns quantile log-return predictions into stored investment predictions

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::features::{trajectory, TrajectoryFeatures};
use super::stats::rank_pct;
use super::{Horizon, MODEL_VERSION};
use crate::store::market::{BricksetSet, MarketStore, PriceSnapshot};
use crate::store::predictions::{InvestmentPrediction, PredictionStore, RiskFactor, Severity};
use crate::store::supabase::SupabaseError;
use crate::util::time::{round2, round_to};

const HIGH_RRP: f64 = 200.0;
const LOW_PIECES: i32 = 100;
const LOW_PIECES_MIN_RRP: f64 = 30.0;
const THIN_THEME_N: u32 = 5;
const LOW_CONFIDENCE: f64 = 0.3;
const NEUTRAL: f64 = 0.5;

/// Log-return quantiles from one horizon's model
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Quantiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreInput {
    pub set_num: String,
    pub rrp_gbp: f64,
    #[serde(default)]
    pub pieces: Option<i32>,
    #[serde(default)]
    pub theme: Option<String>,
    /// Historical comps for the theme in the 1yr training set
    #[serde(default)]
    pub theme_sample_size: Option<u32>,
    #[serde(default)]
    pub horizons: BTreeMap<Horizon, Quantiles>,
    #[serde(default)]
    pub training_r2: Option<f64>,
    #[serde(default)]
    pub validation_r2: Option<f64>,
}

fn appreciation_pct(log_return: f64) -> f64 {
    round2((log_return.exp() - 1.0) * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HorizonScore {
    appreciation: f64,
    price: f64,
    p25: f64,
    p75: f64,
    confidence: f64,
}

fn score_horizon(rrp: f64, q: &Quantiles) -> HorizonScore {
    HorizonScore {
        appreciation: appreciation_pct(q.p50),
        price: round2(rrp * q.p50.exp()),
        p25: appreciation_pct(q.p25),
        p75: appreciation_pct(q.p75),
        confidence: round_to(1.0 / (1.0 + (q.p75 - q.p25).abs()), 4),
    }
}

fn apply(prediction: &mut InvestmentPrediction, horizon: Horizon, s: HorizonScore) {
    let (app, price, p25, p75, conf) = match horizon {
        Horizon::SixMonths => (
            &mut prediction.predicted_6m_appreciation,
            &mut prediction.predicted_6m_price_gbp,
            &mut prediction.pred_6m_p25,
            &mut prediction.pred_6m_p75,
            &mut prediction.confidence_6m,
        ),
        Horizon::OneYear => (
            &mut prediction.predicted_1yr_appreciation,
            &mut prediction.predicted_1yr_price_gbp,
            &mut prediction.pred_1yr_p25,
            &mut prediction.pred_1yr_p75,
            &mut prediction.confidence_1yr,
        ),
        Horizon::TwoYears => (
            &mut prediction.predicted_2yr_appreciation,
            &mut prediction.predicted_2yr_price_gbp,
            &mut prediction.pred_2yr_p25,
            &mut prediction.pred_2yr_p75,
            &mut prediction.confidence_2yr,
        ),
        Horizon::ThreeYears => (
            &mut prediction.predicted_3yr_appreciation,
            &mut prediction.predicted_3yr_price_gbp,
            &mut prediction.pred_3yr_p25,
            &mut prediction.pred_3yr_p75,
            &mut prediction.confidence_3yr,
        ),
    };
    *app = Some(s.appreciation);
    *price = Some(s.price);
    *p25 = Some(s.p25);
    *p75 = Some(s.p75);
    *conf = Some(s.confidence);
}

fn expected_profit(rrp: f64, appreciation: Option<f64>) -> Option<f64> {
    appreciation.map(|a| round2(rrp * a / 100.0))
}

pub fn risk_factors(input: &ScoreInput, prediction: &InvestmentPrediction) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    let mut push = |factor: &str, severity: Severity, detail: String| {
        factors.push(RiskFactor {
            factor: factor.to_string(),
            severity,
            detail,
        })
    };

    if input.rrp_gbp > HIGH_RRP {
        push(
            "high_rrp",
            Severity::Medium,
            format!("RRP of {} may limit buyer pool", input.rrp_gbp),
        );
    }
    if input.pieces.unwrap_or(0) < LOW_PIECES && input.rrp_gbp > LOW_PIECES_MIN_RRP {
        push(
            "low_piece_count",
            Severity::Low,
            "Low piece count relative to price".to_string(),
        );
    }
    if let Some(n) = input.theme_sample_size.filter(|n| *n > 0 && *n < THIN_THEME_N) {
        push(
            "thin_theme_data",
            Severity::Medium,
            format!(
                "Only {} historical comps for {}",
                n,
                input.theme.as_deref().unwrap_or("this theme")
            ),
        );
    }
    if prediction.predicted_1yr_appreciation.is_some_and(|a| a < 0.0) {
        push(
            "negative_forecast",
            Severity::High,
            "Model predicts price decline at 1yr".to_string(),
        );
    }
    if prediction.confidence_1yr.is_some_and(|c| c < LOW_CONFIDENCE) {
        push(
            "high_uncertainty",
            Severity::Medium,
            "Wide prediction interval at 1yr".to_string(),
        );
    }
    factors
}

fn score_one(
    input: &ScoreInput,
    features: Option<&TrajectoryFeatures>,
    now: DateTime<Utc>,
) -> InvestmentPrediction {
    let mut prediction = InvestmentPrediction {
        set_num: input.set_num.clone(),
        model_version: MODEL_VERSION.to_string(),
        scored_at: Some(now),
        features_used: features.cloned().unwrap_or_default().to_json(),
        training_r2: input.training_r2,
        validation_r2: input.validation_r2,
        ..Default::default()
    };
    for (horizon, quantiles) in &input.horizons {
        apply(&mut prediction, *horizon, score_horizon(input.rrp_gbp, quantiles));
    }

    prediction.expected_profit_1yr_gbp =
        expected_profit(input.rrp_gbp, prediction.predicted_1yr_appreciation);
    prediction.expected_profit_3yr_gbp =
        expected_profit(input.rrp_gbp, prediction.predicted_3yr_appreciation);

    let confidence = prediction.confidence_1yr.unwrap_or(NEUTRAL);
    prediction.risk_adjusted_score = Some(match prediction.predicted_1yr_appreciation {
        Some(app) if app != 0.0 => round_to(app * confidence, 4),
        _ => 0.0,
    });
    prediction.risk_factors = risk_factors(input, &prediction);
    prediction
}

/// Composite 0..10 score from batch-relative ranks
fn composite_scores(predictions: &mut [InvestmentPrediction]) {
    let column = |f: fn(&InvestmentPrediction) -> Option<f64>| -> Vec<Option<f64>> {
        predictions.iter().map(f).collect()
    };
    let app_rank = rank_pct(&column(|p| p.predicted_1yr_appreciation));
    let profit_rank = rank_pct(&column(|p| p.expected_profit_1yr_gbp));
    let risk_rank = rank_pct(&column(|p| p.risk_adjusted_score));

    for (i, prediction) in predictions.iter_mut().enumerate() {
        let score = 0.30 * app_rank[i].unwrap_or(NEUTRAL)
            + 0.25 * prediction.confidence_1yr.unwrap_or(NEUTRAL)
            + 0.25 * profit_rank[i].unwrap_or(NEUTRAL)
            + 0.20 * risk_rank[i].unwrap_or(NEUTRAL);
        prediction.investment_score = Some(round2(score * 10.0));
    }
}

/// Score a batch; the composite score needs at least one 1yr prediction
pub fn score_batch(
    inputs: &[ScoreInput],
    features: &HashMap<String, TrajectoryFeatures>,
    now: DateTime<Utc>,
) -> Vec<InvestmentPrediction> {
    let mut predictions: Vec<InvestmentPrediction> = inputs
        .iter()
        .map(|input| score_one(input, features.get(&input.set_num), now))
        .collect();
    if predictions
        .iter()
        .any(|p| p.predicted_1yr_appreciation.is_some())
    {
        composite_scores(&mut predictions);
    }
    predictions
}

fn features_by_set(
    inputs: &[ScoreInput],
    snapshots: &[PriceSnapshot],
) -> HashMap<String, TrajectoryFeatures> {
    let mut by_set: HashMap<&str, Vec<&PriceSnapshot>> = HashMap::new();
    for snapshot in snapshots {
        by_set.entry(snapshot.set_num.as_str()).or_default().push(snapshot);
    }
    inputs
        .iter()
        .filter_map(|input| {
            let snaps = by_set.get_mut(input.set_num.as_str())?;
            snaps.sort_by_key(|s| s.date);
            let features = trajectory(Some(input.rrp_gbp), snaps);
            (features != TrajectoryFeatures::default()).then(|| (input.set_num.clone(), features))
        })
        .collect()
}

/// Fill theme and piece count from the catalogue where the caller left them out
fn with_catalogue(inputs: &[ScoreInput], catalogue: &[BricksetSet]) -> Vec<ScoreInput> {
    let by_number: HashMap<&str, &BricksetSet> = catalogue
        .iter()
        .map(|set| (set.set_number.as_str(), set))
        .collect();
    inputs
        .iter()
        .cloned()
        .map(|mut input| {
            if let Some(set) = by_number.get(input.set_num.as_str()) {
                input.theme = input.theme.or_else(|| set.theme.clone());
                input.pieces = input.pieces.or(set.pieces);
            }
            input
        })
        .collect()
}

/// Score inputs against their price history and store the results
pub async fn score_and_store(
    market: &MarketStore,
    predictions: &PredictionStore,
    inputs: &[ScoreInput],
) -> Result<Vec<InvestmentPrediction>, SupabaseError> {
    let set_numbers: Vec<String> = inputs.iter().map(|i| i.set_num.clone()).collect();
    let inputs = with_catalogue(inputs, &market.set_metadata(&set_numbers).await?);
    let snapshots = market.snapshots_for_sets(&set_numbers).await?;
    let features = features_by_set(&inputs, &snapshots);

    let scored = score_batch(&inputs, &features, Utc::now());
    let stored = predictions.upsert_predictions(&scored).await?;
    info!(scored = scored.len(), stored, "Investment predictions updated");
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(set_num: &str, rrp: f64, one_year: Option<Quantiles>) -> ScoreInput {
        let mut horizons = BTreeMap::new();
        if let Some(q) = one_year {
            horizons.insert(Horizon::OneYear, q);
        }
        ScoreInput {
            set_num: set_num.into(),
            rrp_gbp: rrp,
            pieces: Some(500),
            theme: Some("Technic".into()),
            theme_sample_size: Some(40),
            horizons,
            training_r2: None,
            validation_r2: None,
        }
    }

    fn q(p25: f64, p50: f64, p75: f64) -> Quantiles {
        Quantiles { p25, p50, p75 }
    }

    #[test]
    fn horizon_maths() {
        let s = score_horizon(100.0, &q(0.0, 2f64.ln(), 0.5));
        assert_eq!(s.appreciation, 100.0);
        assert_eq!(s.price, 200.0);
        assert_eq!(s.p25, 0.0);
        assert_eq!(s.confidence, round_to(1.0 / 1.5, 4));
    }

    #[test]
    fn single_prediction_fields() {
        let scored = score_batch(
            &[input("42100", 100.0, Some(q(0.0, 2f64.ln(), 0.5)))],
            &HashMap::new(),
            Utc::now(),
        );
        let p = &scored[0];
        assert_eq!(p.model_version, "v2.1");
        assert_eq!(p.expected_profit_1yr_gbp, Some(100.0));
        assert_eq!(p.expected_profit_3yr_gbp, None);
        assert_eq!(p.risk_adjusted_score, Some(round_to(100.0 * 0.6667, 4)));
        // alone in the batch: ranks are all 1.0
        assert_eq!(p.investment_score, Some(round2(10.0 * (0.30 + 0.25 * 0.6667 + 0.25 + 0.20))));
        assert!(p.risk_factors.is_empty());
        assert_eq!(p.features_used, serde_json::json!({}));
    }

    #[test]
    fn sets_without_prices_get_no_features() {
        let snapshot = |set_num: &str, day: u32, price: Option<f64>| PriceSnapshot {
            set_num: set_num.into(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            price_gbp: price,
            seller_count: Some(12),
            buy_box_winner: Some("Amazon".into()),
            source: None,
        };
        let snapshots = vec![
            snapshot("42100", 1, Some(90.0)),
            snapshot("42100", 2, Some(95.0)),
            snapshot("75192", 1, None),
            snapshot("75192", 2, None),
        ];
        let inputs = [input("42100", 100.0, None), input("75192", 650.0, None)];
        let features = features_by_set(&inputs, &snapshots);
        assert_eq!(features.len(), 1);
        assert_eq!(features["42100"].seller_count_at_retirement, Some(12.0));
        assert!(!features.contains_key("75192"));
    }

    #[test]
    fn ranks_order_the_batch() {
        let scored = score_batch(
            &[
                input("a", 50.0, Some(q(0.1, 0.2, 0.3))),
                input("b", 50.0, Some(q(0.3, 0.4, 0.5))),
                input("c", 50.0, None),
            ],
            &HashMap::new(),
            Utc::now(),
        );
        let a = scored[0].investment_score.unwrap();
        let b = scored[1].investment_score.unwrap();
        let c = scored[2].investment_score.unwrap();
        assert!(b > a);
        // missing 1yr: neutral app, profit and confidence ranks; risk_adjusted 0 ranks lowest
        assert_eq!(c, round2(10.0 * (0.30 * 0.5 + 0.25 * 0.5 + 0.25 * 0.5 + 0.20 / 3.0)));
        assert_eq!(scored[2].risk_adjusted_score, Some(0.0));
    }

    #[test]
    fn no_one_year_predictions_means_no_score() {
        let mut only_3yr = input("x", 20.0, None);
        only_3yr.horizons.insert(Horizon::ThreeYears, q(0.0, 0.1, 0.2));
        let scored = score_batch(&[only_3yr], &HashMap::new(), Utc::now());
        assert_eq!(scored[0].investment_score, None);
        assert!(scored[0].expected_profit_3yr_gbp.is_some());
    }

    #[test]
    fn risk_factor_rules() {
        let mut risky = input("75313", 649.99, Some(q(-1.0, -0.2, 1.5)));
        risky.pieces = Some(50);
        risky.theme_sample_size = Some(3);
        risky.theme = Some("UCS".into());
        let scored = score_batch(&[risky], &HashMap::new(), Utc::now());
        let names: Vec<&str> = scored[0].risk_factors.iter().map(|f| f.factor.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "high_rrp",
                "low_piece_count",
                "thin_theme_data",
                "negative_forecast",
                "high_uncertainty"
            ]
        );
        assert_eq!(scored[0].risk_factors[2].detail, "Only 3 historical comps for UCS");
        assert_eq!(scored[0].risk_factors[3].severity, Severity::High);
    }

    #[test]
    fn horizons_deserialize_by_tag() {
        let input: ScoreInput = serde_json::from_value(serde_json::json!({
            "set_num": "10294",
            "rrp_gbp": 629.99,
            "horizons": { "1yr": { "p25": 0.1, "p50": 0.2, "p75": 0.3 } }
        }))
        .unwrap();
        assert_eq!(input.horizons.get(&Horizon::OneYear), Some(&q(0.1, 0.2, 0.3)));
        assert_eq!(input.pieces, None);
    }

    #[test]
    fn catalogue_fills_only_missing_metadata() {
        let set = |number: &str| BricksetSet {
            set_number: number.into(),
            set_name: None,
            theme: Some("Icons".into()),
            pieces: Some(9090),
            retirement_status: None,
            launch_date: None,
            exit_date: None,
            uk_retail_price: None,
            us_retail_price: None,
            de_retail_price: None,
        };
        let mut bare = input("10294", 629.99, None);
        bare.theme = None;
        bare.pieces = None;
        let given = input("42115", 379.99, None);

        let filled = with_catalogue(&[bare, given], &[set("10294"), set("42115")]);
        assert_eq!(filled[0].theme.as_deref(), Some("Icons"));
        assert_eq!(filled[0].pieces, Some(9090));
        assert_eq!(filled[1].theme.as_deref(), Some("Technic"));
        assert_eq!(filled[1].pieces, Some(500));
    }
}
