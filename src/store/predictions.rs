//! Investment training rows and scored predictions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::supabase::{Query, SupabaseClient, SupabaseError};

const PREDICTIONS: &str = "investment_predictions";
const TRAINING: &str = "investment_training_data";
const UPSERT_BATCH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Good,
    Partial,
    Insufficient,
}

/// Milestone prices and log-return targets for one retired set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub set_num: String,
    pub exit_date: NaiveDate,
    pub rrp_gbp: f64,
    pub price_at_retirement: Option<f64>,
    pub price_6m: Option<f64>,
    pub price_1yr: Option<f64>,
    pub price_2yr: Option<f64>,
    pub price_3yr: Option<f64>,
    pub target_6m: Option<f64>,
    pub target_1yr: Option<f64>,
    pub target_2yr: Option<f64>,
    pub target_3yr: Option<f64>,
    pub data_quality: DataQuality,
    pub snapshot_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub severity: Severity,
    pub detail: String,
}

/// One row of `investment_predictions`, keyed by set number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPrediction {
    pub set_num: String,
    pub model_version: String,
    pub scored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub features_used: serde_json::Value,

    pub predicted_6m_appreciation: Option<f64>,
    pub predicted_6m_price_gbp: Option<f64>,
    pub pred_6m_p25: Option<f64>,
    pub pred_6m_p75: Option<f64>,
    pub confidence_6m: Option<f64>,

    pub predicted_1yr_appreciation: Option<f64>,
    pub predicted_1yr_price_gbp: Option<f64>,
    pub pred_1yr_p25: Option<f64>,
    pub pred_1yr_p75: Option<f64>,
    pub confidence_1yr: Option<f64>,

    pub predicted_2yr_appreciation: Option<f64>,
    pub predicted_2yr_price_gbp: Option<f64>,
    pub pred_2yr_p25: Option<f64>,
    pub pred_2yr_p75: Option<f64>,
    pub confidence_2yr: Option<f64>,

    pub predicted_3yr_appreciation: Option<f64>,
    pub predicted_3yr_price_gbp: Option<f64>,
    pub pred_3yr_p25: Option<f64>,
    pub pred_3yr_p75: Option<f64>,
    pub confidence_3yr: Option<f64>,

    pub expected_profit_1yr_gbp: Option<f64>,
    pub expected_profit_3yr_gbp: Option<f64>,
    pub risk_adjusted_score: Option<f64>,
    pub training_r2: Option<f64>,
    pub validation_r2: Option<f64>,
    pub investment_score: Option<f64>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Clone)]
pub struct PredictionStore {
    client: SupabaseClient,
}

impl PredictionStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Highest scores first
    pub async fn list(
        &self,
        min_score: Option<f64>,
        limit: usize,
    ) -> Result<Vec<InvestmentPrediction>, SupabaseError> {
        let mut query = Query::new();
        if let Some(min) = min_score {
            query = query.gte("investment_score", min);
        }
        self.client
            .get(
                PREDICTIONS,
                &query.order("investment_score.desc.nullslast").limit(limit),
            )
            .await
    }

    pub async fn upsert_predictions(
        &self,
        predictions: &[InvestmentPrediction],
    ) -> Result<usize, SupabaseError> {
        let mut total = 0;
        for batch in predictions.chunks(UPSERT_BATCH) {
            let _: Vec<serde_json::Value> =
                self.client.upsert(PREDICTIONS, batch, "set_num").await?;
            total += batch.len();
        }
        Ok(total)
    }

    pub async fn upsert_training_rows(&self, rows: &[TrainingRow]) -> Result<usize, SupabaseError> {
        let mut total = 0;
        for batch in rows.chunks(UPSERT_BATCH) {
            let _: Vec<serde_json::Value> = self.client.upsert(TRAINING, batch, "set_num").await?;
            total += batch.len();
        }
        Ok(total)
    }
}
