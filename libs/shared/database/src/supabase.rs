use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Thin PostgREST client used by the monitoring store. Requests are authorised with
/// the configured service key.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_timeout(config, config.monitoring.probe_timeout)
    }

    pub fn with_timeout(config: &AppConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, prefer: Option<&'static str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.anon_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        prefer: Option<&'static str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers(prefer)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.with_context(|| format!("request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, None).await?;
        Ok(response.json::<T>().await?)
    }

    /// Inserts one row and returns the stored representation.
    pub async fn insert_returning<R, T>(&self, table: &str, row: &R) -> Result<T>
    where
        R: Serialize,
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let response = self
            .send(Method::POST, &path, Some(serde_json::to_value(row)?), Some("return=representation"))
            .await?;

        let mut rows: Vec<T> = response.json().await?;
        if rows.is_empty() {
            return Err(anyhow!("Insert into {} returned no rows", table));
        }
        Ok(rows.swap_remove(0))
    }

    /// Inserts one row without reading it back.
    pub async fn insert<R: Serialize>(&self, table: &str, row: &R) -> Result<()> {
        let path = format!("/rest/v1/{}", table);
        self.send(Method::POST, &path, Some(serde_json::to_value(row)?), Some("return=minimal"))
            .await?;
        Ok(())
    }

    /// Deletes rows matching a PostgREST filter query (e.g. `created_at=lt.2024-01-01`)
    /// and returns how many were removed.
    pub async fn delete_where(&self, table: &str, filter: &str) -> Result<u64> {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let response = self
            .send(Method::DELETE, &path, None, Some("return=representation"))
            .await?;
        let rows: Vec<Value> = response.json().await?;
        Ok(rows.len() as u64)
    }

    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T> {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, Some(args)).await
    }
}
