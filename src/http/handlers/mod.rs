//! Route handlers, grouped by resource

pub mod cron;
pub mod inventory;
pub mod investment;
pub mod listings;
pub mod negotiation;
pub mod orders;
pub mod purchases;
pub mod reports;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::error::AppError;
use crate::store::supabase::Page;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MAX_PAGE_SIZE: usize = 100;

/// `?page=&page_size=`, 1-based
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageParams {
    /// `(page, page_size, offset)`; page size is capped rather than rejected
    pub fn resolve(&self) -> Result<(usize, usize, usize), AppError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::BadRequest("page starts at 1".to_string()));
        }
        let size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        // The Range header needs `offset + size` to fit as well
        let offset = (page - 1)
            .checked_mul(size)
            .filter(|offset| offset.checked_add(size).is_some())
            .ok_or_else(|| AppError::BadRequest("page is out of range".to_string()))?;
        Ok((page, size, offset))
    }
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: Option<u64>,
}

impl<T> Paged<T> {
    pub fn new(page: Page<T>, number: usize, size: usize) -> Self {
        Self {
            data: page.rows,
            page: number,
            page_size: size,
            total: page.total,
        }
    }
}

/// `text/csv` attachment
pub fn csv_attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Trimmed, or `None` when blank
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
