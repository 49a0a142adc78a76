// src/services/api_client.rs
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::{
    errors::{LiveError, LiveResult},
    models::{Order, OrderDto, PushTokenUpdate, TrackingSample},
};

/// Source of the session's bearer token. Storage is up to the embedder.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, e.g. read once from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Profile endpoint used to store the push descriptor.
#[async_trait]
pub trait ProfileUpdater: Send + Sync {
    async fn update_push_token(&self, push_token: String) -> LiveResult<()>;
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

pub struct ApiClient {
    config: ApiConfig,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(config: ApiConfig, credentials: Arc<dyn CredentialProvider>) -> LiveResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header("Accept", "application/json");

        match self.credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> LiveResult<reqwest::Response> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LiveError::from_status(status, error_text));
        }

        Ok(response)
    }

    pub async fn get_order(&self, order_id: &str) -> LiveResult<Order> {
        tracing::debug!("Fetching order: {}", order_id);

        let response = self
            .send(self.request(Method::GET, &format!("orders/{}/", order_id)))
            .await?;
        let dto: OrderDto = response.json().await?;

        dto.into_order()
    }

    pub async fn get_tracking(&self, order_id: &str) -> LiveResult<Option<TrackingSample>> {
        tracing::debug!("Fetching tracking for order: {}", order_id);

        let response = self
            .request(Method::GET, &format!("orders/{}/tracking/", order_id))
            .send()
            .await?;

        // No courier position yet
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LiveError::from_status(status, error_text));
        }

        let sample: Option<TrackingSample> = response.json().await?;
        Ok(sample)
    }

    pub async fn assign_courier(&self, order_id: &str) -> LiveResult<()> {
        tracing::info!("Requesting courier assignment for order: {}", order_id);

        self.send(self.request(Method::POST, &format!("orders/{}/assign-courier/", order_id)))
            .await?;
        Ok(())
    }

    pub async fn start_delivery(&self, assignment_id: &str) -> LiveResult<()> {
        tracing::info!("Starting delivery for assignment: {}", assignment_id);

        self.send(self.request(
            Method::POST,
            &format!("delivery-assignments/{}/start/", assignment_id),
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileUpdater for ApiClient {
    async fn update_push_token(&self, push_token: String) -> LiveResult<()> {
        tracing::debug!("Uploading push token to profile");

        let body = PushTokenUpdate { push_token };
        self.send(self.request(Method::PATCH, "profile/").json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(
            ApiConfig {
                base_url: base_url.to_string(),
                request_timeout: Duration::from_secs(5),
            },
            Arc::new(StaticCredentials::anonymous()),
        )
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let api = client("http://localhost:8000/api/");
        assert_eq!(api.url("/orders/1/"), "http://localhost:8000/api/orders/1/");
        assert_eq!(api.url("profile/"), "http://localhost:8000/api/profile/");
    }

    #[test]
    fn test_static_credentials() {
        assert_eq!(StaticCredentials::new("tok").bearer_token().as_deref(), Some("tok"));
        assert!(StaticCredentials::anonymous().bearer_token().is_none());
    }
}
