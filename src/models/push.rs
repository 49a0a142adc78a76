// src/models/push.rs
use serde::{Deserialize, Serialize};

/// Keys the push service hands back for a subscription.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubscriptionKeys {
    pub p256dh: String, // Device public key
    pub auth: String,
}

/// Descriptor the push service returns for this device.
///
/// Serializes to the standard Web Push subscription JSON, which is what the
/// profile endpoint stores as `push_token`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

impl PushSubscription {
    pub fn new(endpoint: impl Into<String>, p256dh: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPermission {
    Default, // Never asked
    Granted,
    Denied,
}

/// Body of the profile `PATCH` carrying the serialized subscription.
#[derive(Debug, Serialize, Deserialize)]
pub struct PushTokenUpdate {
    pub push_token: String,
}
