// src/services/push_service.rs
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing;

use crate::{
    models::{PushPermission, PushSubscription},
    services::api_client::ProfileUpdater,
    utils::base64url,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PushError {
    #[error("Push capability unavailable")]
    CapabilityUnavailable,

    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Server push key could not be decoded")]
    InvalidServerKey,

    #[error("Push registration failed: {0}")]
    Registration(String),

    #[error("Push subscription failed: {0}")]
    Subscription(String),

    #[error("Subscription upload failed: {0}")]
    Upload(String),
}

/// The device/runtime push capability (service worker + push manager).
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn is_supported(&self) -> bool;
    fn permission(&self) -> PushPermission;
    async fn request_permission(&self) -> PushPermission;
    async fn register(&self) -> Result<(), PushError>;
    async fn existing_subscription(&self) -> Option<PushSubscription>;
    async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushSubscription, PushError>;
}

/// Platform for hosts without push support. Keeps the feature disabled.
#[derive(Debug, Default)]
pub struct UnsupportedPushPlatform;

#[async_trait]
impl PushPlatform for UnsupportedPushPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    fn permission(&self) -> PushPermission {
        PushPermission::Denied
    }

    async fn request_permission(&self) -> PushPermission {
        PushPermission::Denied
    }

    async fn register(&self) -> Result<(), PushError> {
        Err(PushError::CapabilityUnavailable)
    }

    async fn existing_subscription(&self) -> Option<PushSubscription> {
        None
    }

    async fn subscribe(&self, _application_server_key: &[u8]) -> Result<PushSubscription, PushError> {
        Err(PushError::CapabilityUnavailable)
    }
}

/// Per-session owner of the device's push subscription.
pub struct PushSubscriptionManager {
    platform: Arc<dyn PushPlatform>,
    profile: Arc<dyn ProfileUpdater>,
    server_key: Option<String>,
    registration: std::sync::Mutex<Arc<OnceCell<()>>>, // fresh cell per session
    subscription: Mutex<Option<PushSubscription>>,
}

impl PushSubscriptionManager {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        profile: Arc<dyn ProfileUpdater>,
        server_key: Option<String>,
    ) -> Self {
        Self {
            platform,
            profile,
            server_key,
            registration: std::sync::Mutex::new(Arc::new(OnceCell::new())),
            subscription: Mutex::new(None),
        }
    }

    fn server_key(&self) -> Option<&str> {
        self.server_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    fn check_capability(&self) -> Result<&str, PushError> {
        if !self.platform.is_supported() {
            return Err(PushError::CapabilityUnavailable);
        }
        self.server_key().ok_or(PushError::CapabilityUnavailable)
    }

    fn registration(&self) -> Arc<OnceCell<()>> {
        match self.registration.lock() {
            Ok(cell) => cell.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Registers with the platform once. Concurrent callers wait for the
    /// first one; a failed registration is retried on the next call.
    /// `Ok(false)` means push is disabled here.
    pub async fn init(&self) -> Result<bool, PushError> {
        if self.check_capability().is_err() {
            tracing::debug!("Push notifications disabled: capability or server key missing");
            return Ok(false);
        }

        let registration = self.registration();
        registration
            .get_or_try_init(|| async {
                self.platform.register().await?;
                tracing::info!("Push capability registered");
                Ok::<(), PushError>(())
            })
            .await?;
        Ok(true)
    }

    /// Subscribes this device and uploads the descriptor to the profile.
    ///
    /// Returns `Ok(None)` when push is disabled or the server key is
    /// unusable, and `Err(PermissionDenied)` without prompting when the user
    /// already refused notifications.
    pub async fn subscribe(&self) -> Result<Option<PushSubscription>, PushError> {
        let raw_key = match self.check_capability() {
            Ok(key) => key,
            Err(_) => {
                tracing::debug!("Skipping push subscription: feature disabled");
                return Ok(None);
            }
        };

        let mut slot = self.subscription.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(Some(existing.clone()));
        }

        let Some(server_key) = base64url::decode_key(raw_key) else {
            tracing::warn!("{}", PushError::InvalidServerKey);
            return Ok(None);
        };

        match self.platform.permission() {
            PushPermission::Granted => {}
            PushPermission::Denied => return Err(PushError::PermissionDenied),
            PushPermission::Default => {
                if self.platform.request_permission().await != PushPermission::Granted {
                    tracing::info!("User declined push notifications");
                    return Err(PushError::PermissionDenied);
                }
            }
        }

        self.init().await?;

        let subscription = match self.platform.existing_subscription().await {
            Some(existing) => existing,
            None => self.platform.subscribe(&server_key).await?,
        };
        *slot = Some(subscription.clone());
        drop(slot);

        tracing::info!("Push subscription active for endpoint {}", subscription.endpoint);
        self.upload(&subscription).await;

        Ok(Some(subscription))
    }

    /// Best effort; the local subscription stays even if this fails.
    async fn upload(&self, subscription: &PushSubscription) {
        let push_token = match serde_json::to_string(subscription) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Could not serialize push subscription: {}", e);
                return;
            }
        };

        if let Err(e) = self.profile.update_push_token(push_token).await {
            tracing::warn!("{}; will retry on next session start", PushError::Upload(e.to_string()));
        }
    }

    pub async fn current(&self) -> Option<PushSubscription> {
        self.subscription.lock().await.clone()
    }

    /// Forgets this session's registration and subscription. The push
    /// service itself is left untouched.
    pub async fn teardown(&self) {
        *self.subscription.lock().await = None;
        let fresh = Arc::new(OnceCell::new());
        match self.registration.lock() {
            Ok(mut cell) => *cell = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        tracing::debug!("Push subscription manager torn down");
    }
}
