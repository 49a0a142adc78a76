// src/models/mod.rs
pub mod order;
pub mod tracking;
pub mod notification;
pub mod messages;
pub mod push;

pub use order::*;
pub use tracking::*;
pub use notification::*;
pub use messages::*;
pub use push::*;
