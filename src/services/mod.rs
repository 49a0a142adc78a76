// src/services/mod.rs
pub mod api_client;
pub mod tracking_source;
pub mod simulated_source;
pub mod order_tracker;
pub mod notification_channel;
pub mod notification_store;
pub mod push_service;
