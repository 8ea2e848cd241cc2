//! Supabase REST API client using service_role key

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::Config;

/// Rows per request when walking a whole table
pub const PAGE_SIZE: usize = 1000;

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS, so every tenant query must filter on user_id.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

/// PostgREST query string builder
///
/// Values go through reqwest's query encoding, so user input can be passed as-is.
#[derive(Debug, Clone, Default)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, column: &str, op: &str, value: impl std::fmt::Display) -> Self {
        self.params
            .push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn gt(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(column, "not.is", "null")
    }

    /// `column IN (...)`, values are double-quoted so commas inside them survive
    pub fn in_list<S: AsRef<str>>(self, column: &str, values: &[S]) -> Self {
        let list = values
            .iter()
            .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({})", list))
    }

    /// Raw `or=(...)` group, e.g. `uk_retail_price.is.null,uk_retail_price.lt.5`
    pub fn or(mut self, conditions: &str) -> Self {
        self.params
            .push(("or".to_string(), format!("({})", conditions)));
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn order(mut self, spec: &str) -> Self {
        self.params.push(("order".to_string(), spec.to_string()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".to_string(), n.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// One page of rows plus the total the server counted
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: Option<u64>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: Response) -> Result<Response, SupabaseError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SupabaseError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.rest_url(table)))
            .query(query.params())
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.rest_url(table)))
            .header("Accept", "application/vnd.pgrst.object+json")
            .query(query.params())
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(SupabaseError::Parse)
    }

    /// GET one page using the Range header; `offset` is zero-based
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
        offset: usize,
        limit: usize,
    ) -> Result<Page<T>, SupabaseError> {
        let end = offset + limit.max(1) - 1;
        let response = self
            .authed(self.client.get(self.rest_url(table)))
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{}", offset, end))
            .header("Prefer", "count=exact")
            .query(query.params())
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = Self::check(response).await?;
        let total = response
            .headers()
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let rows = response.json().await.map_err(SupabaseError::Parse)?;
        Ok(Page { rows, total })
    }

    /// Walk every page of a query until a short page comes back
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, SupabaseError> {
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page: Page<T> = self.get_page(table, query, offset, PAGE_SIZE).await?;
            let fetched = page.rows.len();
            rows.extend(page.rows);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(rows)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let results: Vec<R> = self.insert_many(table, std::slice::from_ref(data)).await?;
        // PostgREST returns an array, get first element
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Bulk insert returning the created rows
    pub async fn insert_many<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<Vec<R>, SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &Query,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let response = self
            .authed(self.client.patch(self.rest_url(table)))
            .query(query.params())
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await?;
        Ok(())
    }

    /// PATCH returning the updated rows (empty when nothing matched)
    pub async fn update_returning<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
        data: &T,
    ) -> Result<Vec<R>, SupabaseError> {
        let response = self
            .authed(self.client.patch(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .query(query.params())
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Upsert (insert or update on conflict), returning the stored rows
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        rows: &[T],
        on_conflict: &str,
    ) -> Result<Vec<R>, SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", on_conflict)])
            .json(rows)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// DELETE matching rows
    pub async fn delete(&self, table: &str, query: &Query) -> Result<(), SupabaseError> {
        let response = self
            .authed(self.client.delete(self.rest_url(table)))
            .query(query.params())
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await?;
        Ok(())
    }
}

/// `0-24/3573` → 3573, `*/0` → 0, unknown totals (`0-24/*`) → None
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next().and_then(|t| t.parse().ok())
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}

impl SupabaseError {
    /// Unique or foreign-key violation reported by Postgres
    pub fn is_conflict(&self) -> bool {
        match self {
            SupabaseError::Api { status, body } => {
                *status == 409 || body.contains("23505") || body.contains("23503")
            }
            _ => false,
        }
    }

    /// Foreign-key violation: another row still points at this one
    pub fn is_still_referenced(&self) -> bool {
        matches!(self, SupabaseError::Api { body, .. } if body.contains("23503"))
    }
}
