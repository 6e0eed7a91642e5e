//! Shared HTTP JSON client for peer services
//!
//! Provides pooled, timeout-bounded communication with one peer service and
//! maps transport and status failures onto `AppError`.

use callctl_core::{AppError, AppResult};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Request id header forwarded to peers
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client for one peer service
pub struct PeerClient {
    http_client: Client,
    base_url: String,
    service: &'static str,
    timeout_ms: u64,
    request_id: AtomicU64,
}

impl PeerClient {
    /// Create a new peer client
    ///
    /// # Arguments
    ///
    /// * `service` - Peer name used in errors and logs (e.g. "flow")
    /// * `base_url` - Service root (e.g. "http://flow-manager:9000")
    /// * `timeout_ms` - Timeout for requests in milliseconds
    pub fn new(service: &'static str, base_url: &str, timeout_ms: u64) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("{} client: {}", service, e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
            timeout_ms,
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a path on this peer
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> AppResult<R> {
        let response = self.send(self.http_client.get(self.url(path))).await?;
        self.parse(response).await
    }

    pub async fn get_query<Q, R>(&self, path: &str, query: &Q) -> AppResult<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .send(self.http_client.get(self.url(path)).query(query))
            .await?;
        self.parse(response).await
    }

    pub async fn post<T, R>(&self, path: &str, body: &T) -> AppResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .send(self.http_client.post(self.url(path)).json(body))
            .await?;
        self.parse(response).await
    }

    /// POST ignoring the response body
    pub async fn post_unit<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<()> {
        self.send(self.http_client.post(self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    pub async fn put_unit<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<()> {
        self.send(self.http_client.put(self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    pub async fn delete_unit(&self, path: &str) -> AppResult<()> {
        self.send(self.http_client.delete(self.url(path)))
            .await
            .map(|_| ())
    }

    /// DELETE with a JSON body
    pub async fn delete_with<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<()> {
        self.send(self.http_client.delete(self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, request), fields(service = %self.service))]
    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        let request_id = self.next_id();
        debug!("{} request id={}", self.service, request_id);

        let response = request
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        "{} request timed out after {}ms",
                        self.service, self.timeout_ms
                    );
                    AppError::PeerTimeout(self.service.to_string())
                } else {
                    error!("{} connection error: {}", self.service, e);
                    AppError::peer(self.service, e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("{} HTTP error: status={} body={}", self.service, status, body);

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{}: {}", self.service, body)));
        }
        Err(AppError::peer(
            self.service,
            format!("status {}: {}", status.as_u16(), body),
        ))
    }

    async fn parse<R: DeserializeOwned>(&self, response: Response) -> AppResult<R> {
        let body = response.text().await.map_err(|e| {
            AppError::peer(self.service, format!("Failed to read response body: {}", e))
        })?;

        serde_json::from_str(&body).map_err(|e| {
            AppError::peer(
                self.service,
                format!("Failed to parse JSON: {} - Body: {}", e, body),
            )
        })
    }
}
