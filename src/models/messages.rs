// src/models/messages.rs
use serde::{Deserialize, Serialize};

use super::notification::Notification;

/// Frames the client sends over the notification channel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Authenticate { token: String },
}

/// Frames the server sends over the notification channel.
///
/// Unknown `type` values decode to `Unknown` so newer servers never break
/// older clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Authenticated { success: bool },
    Notification { notification: Notification },
    UnreadCount { count: u32 },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    PermanentlyDisconnected,
}
