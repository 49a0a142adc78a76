// src/utils/mod.rs
pub mod base64url;
pub mod debug_flags;
pub mod telemetry;
