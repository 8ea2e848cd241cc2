//! Fee backfill for orders synced without fee data

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::ebay_auth::{TokenError, TokenProvider};
use crate::clients::FeeSource;
use crate::store::orders::PlatformOrder;
use crate::store::supabase::SupabaseError;
use crate::store::{OrderStore, Platform};
use crate::util::time::round2;

/// Orders examined per cron run
pub const BACKFILL_BATCH: usize = 500;

/// Percentage plus fixed per-order charge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRate {
    pub percent: f64,
    pub fixed: f64,
}

/// Typical UK seller fees, used when the marketplace reports nothing
pub fn fee_rate(platform: Platform) -> FeeRate {
    match platform {
        Platform::Ebay => FeeRate { percent: 12.8, fixed: 0.30 },
        Platform::Amazon => FeeRate { percent: 15.3, fixed: 0.0 },
        // Marketplace commission plus PayPal
        Platform::Bricklink => FeeRate { percent: 3.0 + 2.9, fixed: 0.30 },
        Platform::Brickowl => FeeRate { percent: 2.5 + 2.9, fixed: 0.30 },
        Platform::Bricqer => FeeRate { percent: 3.5, fixed: 0.0 },
    }
}

pub fn estimate_fee(platform: Platform, total: f64) -> f64 {
    let rate = fee_rate(platform);
    round2(total * rate.percent / 100.0 + rate.fixed)
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FeeBackfillReport {
    pub examined: usize,
    pub updated: usize,
    pub estimated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct FeeBackfill {
    orders: OrderStore,
    source: Arc<dyn FeeSource>,
    tokens: Arc<dyn TokenProvider>,
}

impl FeeBackfill {
    pub fn new(orders: OrderStore, source: Arc<dyn FeeSource>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            orders,
            source,
            tokens,
        }
    }

    pub async fn run(&self, limit: usize) -> Result<FeeBackfillReport, SupabaseError> {
        let pending = self.orders.list_missing_fees(limit).await?;
        let mut report = FeeBackfillReport::default();
        // Tokens per tenant; None marks a tenant without a usable eBay connection
        let mut tokens: HashMap<Uuid, Option<String>> = HashMap::new();

        for order in pending {
            report.examined += 1;

            let actual = match self.actual_fees(&order, &mut tokens).await {
                Ok(fees) => fees,
                Err(message) => {
                    warn!(order_id = %order.id, error = %message, "Fee lookup failed");
                    report.failed += 1;
                    continue;
                }
            };

            let (fees, estimated) = match (actual, order.total) {
                (Some(fees), _) => (round2(fees), false),
                (None, Some(total)) => (estimate_fee(order.platform, total), true),
                (None, None) => {
                    report.skipped += 1;
                    continue;
                }
            };

            if let Err(e) = self.orders.set_fees(order.id, fees, estimated).await {
                warn!(order_id = %order.id, error = %e, "Fee write failed");
                report.failed += 1;
                continue;
            }
            report.updated += 1;
            if estimated {
                report.estimated += 1;
            }
        }

        info!(
            examined = report.examined,
            updated = report.updated,
            estimated = report.estimated,
            failed = report.failed,
            "Fee backfill finished"
        );
        Ok(report)
    }

    async fn actual_fees(
        &self,
        order: &PlatformOrder,
        tokens: &mut HashMap<Uuid, Option<String>>,
    ) -> Result<Option<f64>, String> {
        if order.platform != Platform::Ebay {
            return Ok(None);
        }

        if !tokens.contains_key(&order.user_id) {
            let token = match self.tokens.access_token(order.user_id).await {
                Ok(token) => Some(token),
                Err(TokenError::NotConnected) | Err(TokenError::Expired) => None,
                Err(e) => return Err(e.to_string()),
            };
            tokens.insert(order.user_id, token);
        }

        match tokens.get(&order.user_id).cloned().flatten() {
            Some(token) => self
                .source
                .order_fees(&token, &order.platform_order_id)
                .await
                .map_err(|e| e.to_string()),
            None => Ok(None),
        }
    }
}
