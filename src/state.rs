// src/state.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{
    errors::{LiveError, LiveResult},
    models::GeoPoint,
    services::{
        api_client::{ApiClient, ApiConfig, CredentialProvider},
        notification_channel::{ChannelConfig, ChannelError, Connector, NotificationChannel, WsConnector},
        notification_store::NotificationStore,
        order_tracker::{OrderStateTracker, TrackerConfig},
        push_service::{PushPlatform, PushSubscriptionManager, UnsupportedPushPlatform},
        simulated_source::SimulatedTrackingSource,
        tracking_source::{RemoteTrackingSource, TrackingSource},
    },
    utils::debug_flags::{DebugFlags, TrackingMode},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub vapid_public_key: Option<String>,
    pub debug_flags_path: PathBuf,
    pub poll_interval: Duration,
    pub start_delivery_delay: Duration,
    pub order_failure_threshold: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    pub simulated_customer_location: GeoPoint,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            vapid_public_key: None,
            debug_flags_path: PathBuf::from(".sparrow-debug.json"),
            poll_interval: Duration::from_secs(5),
            start_delivery_delay: Duration::from_secs(30),
            order_failure_threshold: 3,
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            simulated_customer_location: GeoPoint::new(30.049789, 31.233234),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> LiveResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SPARROW_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = std::env::var("SPARROW_WS_URL") {
            config.ws_base_url = url;
        }
        if let Ok(key) = std::env::var("SPARROW_VAPID_PUBLIC_KEY") {
            config.vapid_public_key = Some(key);
        }
        if let Ok(path) = std::env::var("SPARROW_DEBUG_FLAGS") {
            config.debug_flags_path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("SPARROW_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                LiveError::ConfigurationError(format!("SPARROW_REQUEST_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(LiveError::invalid_configuration("api_base_url is empty"));
        }
        if self.ws_base_url.trim().is_empty() {
            return Err(LiveError::invalid_configuration("ws_base_url is empty"));
        }
        if !(self.ws_base_url.starts_with("ws://") || self.ws_base_url.starts_with("wss://")) {
            return Err(LiveError::InvalidUrl(self.ws_base_url.clone()));
        }
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("start_delivery_delay", self.start_delivery_delay),
            ("reconnect_delay", self.reconnect_delay),
            ("handshake_timeout", self.handshake_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(LiveError::invalid_configuration(format!("{} must be positive", name)));
            }
        }
        if self.max_reconnect_attempts == 0 {
            return Err(LiveError::invalid_configuration("max_reconnect_attempts must be positive"));
        }
        if self.order_failure_threshold == 0 {
            return Err(LiveError::invalid_configuration("order_failure_threshold must be positive"));
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_base_url.clone(),
            request_timeout: self.request_timeout,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: self.poll_interval,
            start_delivery_delay: self.start_delivery_delay,
            order_failure_threshold: self.order_failure_threshold,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: format!("{}/ws/notifications/", self.ws_base_url.trim_end_matches('/')),
            reconnect_delay: self.reconnect_delay,
            max_attempts: self.max_reconnect_attempts,
            handshake_timeout: self.handshake_timeout,
            ..ChannelConfig::default()
        }
    }
}

/// Everything scoped to one authenticated session.
pub struct SessionState {
    pub config: AppConfig,
    pub api: Arc<ApiClient>,
    pub channel: Arc<NotificationChannel>,
    pub store: Arc<Mutex<NotificationStore>>,
    pub push: Arc<PushSubscriptionManager>,
    debug_flags: DebugFlags,
    feed_task: Option<JoinHandle<()>>,
    push_task: Option<JoinHandle<()>>,
}

impl SessionState {
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialProvider>,
        push_platform: Option<Arc<dyn PushPlatform>>,
    ) -> LiveResult<Self> {
        let push_platform: Arc<dyn PushPlatform> = match push_platform {
            Some(platform) => platform,
            None => {
                tracing::warn!("No push platform available, push notifications disabled");
                Arc::new(UnsupportedPushPlatform)
            }
        };
        Self::with_connector(config, credentials, push_platform, Arc::new(WsConnector))
    }

    pub fn with_connector(
        config: AppConfig,
        credentials: Arc<dyn CredentialProvider>,
        push_platform: Arc<dyn PushPlatform>,
        connector: Arc<dyn Connector>,
    ) -> LiveResult<Self> {
        config.validate()?;

        let api = Arc::new(ApiClient::new(config.api_config(), credentials.clone())?);
        let channel = Arc::new(NotificationChannel::new(config.channel_config(), connector, credentials));
        let push = Arc::new(PushSubscriptionManager::new(
            push_platform,
            api.clone(),
            config.vapid_public_key.clone(),
        ));
        let debug_flags = DebugFlags::load(&config.debug_flags_path);

        if debug_flags.tracking_mode() == TrackingMode::Simulated {
            tracing::warn!("Tracking simulation enabled by {}", config.debug_flags_path.display());
        }

        Ok(Self {
            config,
            api,
            channel,
            store: Arc::new(Mutex::new(NotificationStore::new())),
            push,
            debug_flags,
            feed_task: None,
            push_task: None,
        })
    }

    /// Connects the notification channel and subscribes to push in the background.
    pub fn start(&mut self) -> LiveResult<()> {
        if self.feed_task.is_none() {
            let events = self.channel.feed();
            self.feed_task = Some(NotificationStore::spawn_feed(self.store.clone(), events));
        }

        match self.channel.connect() {
            Ok(()) => {}
            Err(ChannelError::MissingCredential) => return Err(LiveError::MissingCredential),
            Err(e) => tracing::warn!("Notification channel did not start: {}", e),
        }

        if self.push_task.is_none() {
            let push = self.push.clone();
            self.push_task = Some(tokio::spawn(async move {
                match push.subscribe().await {
                    Ok(Some(_)) => {}
                    Ok(None) => tracing::debug!("Push notifications not available for this session"),
                    Err(e) => tracing::info!("Push subscription skipped: {}", e),
                }
            }));
        }

        Ok(())
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.debug_flags.tracking_mode()
    }

    /// Source for a newly viewed order, chosen once from the debug flags.
    pub fn tracking_source(&self) -> Arc<dyn TrackingSource> {
        match self.tracking_mode() {
            TrackingMode::Remote => Arc::new(RemoteTrackingSource::new(self.api.clone())),
            TrackingMode::Simulated => {
                Arc::new(SimulatedTrackingSource::new(self.config.simulated_customer_location))
            }
        }
    }

    pub fn track_order(&self, order_id: impl Into<String>) -> OrderStateTracker {
        let mut tracker = OrderStateTracker::new(self.tracking_source(), self.config.tracker_config());
        tracker.start(order_id);
        tracker
    }

    pub async fn logout(&mut self) {
        self.channel.disconnect().await;

        if let Some(task) = self.push_task.take() {
            task.abort();
        }
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }

        self.store.lock().await.clear();
        self.push.teardown().await;
        tracing::info!("Session closed");
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api_client::StaticCredentials;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_timings() {
        let config = AppConfig::default();
        assert_eq!(config.tracker_config().poll_interval, Duration::from_secs(5));
        assert_eq!(config.tracker_config().start_delivery_delay, Duration::from_secs(30));
        assert_eq!(config.channel_config().reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.channel_config().max_attempts, 5);
    }

    #[test]
    fn test_channel_url() {
        let config = AppConfig {
            ws_base_url: "wss://api.example.com/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.channel_config().url, "wss://api.example.com/ws/notifications/");
    }

    #[test]
    fn test_invalid_configs() {
        let config = AppConfig {
            poll_interval: Duration::ZERO,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(LiveError::InvalidConfiguration(_))));

        let config = AppConfig {
            ws_base_url: "http://localhost:8000".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(LiveError::InvalidUrl(_))));

        let config = AppConfig {
            max_reconnect_attempts: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn flags_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sparrow-state-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_tracking_mode_follows_debug_flags() {
        let path = flags_path("simulated");
        DebugFlags { simulate_tracking: true }.save(&path).unwrap();

        let config = AppConfig {
            debug_flags_path: path.clone(),
            ..AppConfig::default()
        };
        let session = SessionState::new(config, Arc::new(StaticCredentials::new("t")), None).unwrap();
        assert_eq!(session.tracking_mode(), TrackingMode::Simulated);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_missing_flags_file_means_remote() {
        let config = AppConfig {
            debug_flags_path: flags_path("absent"),
            ..AppConfig::default()
        };
        let session = SessionState::new(config, Arc::new(StaticCredentials::new("t")), None).unwrap();
        assert_eq!(session.tracking_mode(), TrackingMode::Remote);
    }

    #[tokio::test]
    async fn test_start_without_credential_fails() {
        let config = AppConfig {
            debug_flags_path: flags_path("anonymous"),
            ..AppConfig::default()
        };
        let mut session = SessionState::new(config, Arc::new(StaticCredentials::anonymous()), None).unwrap();
        assert!(matches!(session.start(), Err(LiveError::MissingCredential)));

        session.logout().await;
        assert_eq!(session.channel.state(), crate::models::ConnectionState::Disconnected);
        assert_eq!(session.store.lock().await.unread_count(), 0);
    }
}
