pub mod errors;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{LiveError, LiveResult};
pub use state::{AppConfig, SessionState};
