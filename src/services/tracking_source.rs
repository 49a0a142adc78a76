// src/services/tracking_source.rs
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    errors::LiveError as AppError,
    models::{Order, TrackingSample},
    services::api_client::ApiClient,
};

/// Where an `OrderStateTracker` gets its data from and sends its side effects to.
#[async_trait]
pub trait TrackingSource: Send + Sync {
    async fn fetch_order(&self, order_id: &str) -> Result<Order, AppError>;
    async fn fetch_tracking(&self, order_id: &str) -> Result<Option<TrackingSample>, AppError>;
    async fn assign_courier(&self, order_id: &str) -> Result<(), AppError>;
    async fn start_delivery(&self, assignment_id: &str) -> Result<(), AppError>;
}

/// Backend-driven source used on the default path.
pub struct RemoteTrackingSource {
    api: Arc<ApiClient>,
}

impl RemoteTrackingSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TrackingSource for RemoteTrackingSource {
    async fn fetch_order(&self, order_id: &str) -> Result<Order, AppError> {
        self.api.get_order(order_id).await
    }

    async fn fetch_tracking(&self, order_id: &str) -> Result<Option<TrackingSample>, AppError> {
        self.api.get_tracking(order_id).await
    }

    async fn assign_courier(&self, order_id: &str) -> Result<(), AppError> {
        self.api.assign_courier(order_id).await
    }

    async fn start_delivery(&self, assignment_id: &str) -> Result<(), AppError> {
        self.api.start_delivery(assignment_id).await
    }
}
