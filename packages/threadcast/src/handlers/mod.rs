pub mod health;
pub mod live;
pub mod posts;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use live::{live_thread_middleware, parse_thread_target};
pub use posts::create_post;
