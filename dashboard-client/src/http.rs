//! HTTP client for the order API and its event stream

use crate::api::{DeletedOrder, OrderApi, OrdersPayload, StatusChange};
use crate::sse::{self, FrameStream};
use crate::{ClientConfig, ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::order::{Order, OrderStatus};
use std::time::Duration;

/// HTTP client for making network requests to the order API
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Same pool settings without a total timeout; an event stream stays open indefinitely
    stream_client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout);
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(connect_timeout)
            .build()?;
        let stream_client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    /// Set the authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the current token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build authorization header value
    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        request
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let request = self.authorized(self.client.get(self.url(path)).query(query));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let request = self.authorized(self.client.patch(self.url(path)).json(body));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.authorized(self.client.delete(self.url(path)));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Map non-success statuses to client errors
    async fn check_status(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await?;
        match status {
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ClientError::Forbidden(text)),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(text)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ClientError::Validation(text))
            }
            _ => Err(ClientError::Internal(text)),
        }
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl OrderApi for HttpClient {
    async fn open_stream(&self, store_id: &str) -> ClientResult<FrameStream> {
        let request = self.authorized(
            self.stream_client
                .get(self.url("admin/orders/sse"))
                .query(&[("store_id", store_id)])
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .header(reqwest::header::CACHE_CONTROL, "no-cache"),
        );
        let response = Self::check_status(request.send().await?).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(ClientError::Stream(format!(
                "unexpected content type {content_type:?} for event stream"
            )));
        }

        tracing::debug!(store_id = %store_id, "Event stream response received");
        Ok(sse::frames(response.bytes_stream()))
    }

    async fn fetch_orders(&self, store_id: &str) -> ClientResult<Vec<Order>> {
        let payload: OrdersPayload = self.get("admin/orders", &[("store_id", store_id)]).await?;
        Ok(payload.into_orders())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> ClientResult<StatusChange> {
        #[derive(serde::Serialize)]
        struct StatusRequest {
            status: OrderStatus,
        }

        self.patch(&format!("admin/orders/{order_id}/status"), &StatusRequest { status })
            .await
    }

    async fn delete_order(&self, order_id: &str) -> ClientResult<DeletedOrder> {
        self.delete(&format!("admin/orders/{order_id}")).await
    }
}
