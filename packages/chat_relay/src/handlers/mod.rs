pub mod health;
pub mod models;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::health_handler;
pub use models::models_handler;
pub use websocket::{root_handler, websocket_handler};
