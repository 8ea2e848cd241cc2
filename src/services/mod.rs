//! Business workflows that sit between the route handlers and the stores

pub mod ebay_auth;
pub mod fees;
pub mod negotiation;
pub mod reports;
pub mod sku_issues;
pub mod sync;

use crate::clients::EbayError;
use crate::store::supabase::SupabaseError;

pub use ebay_auth::{EbayTokens, TokenError, TokenProvider};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("eBay request failed: {0}")]
    Ebay(#[from] EbayError),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid {0}")]
    InvalidInput(&'static str),
}
