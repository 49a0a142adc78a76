// src/models/notification.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    #[serde(alias = "type")]
    pub kind: String, // e.g. "order_update", "message", "promotion"
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value, // App-specific data
}

impl Notification {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            body: body.into(),
            is_read: false,
            created_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }
}
