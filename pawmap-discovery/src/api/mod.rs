//! HTTP API for the validation queue

pub mod health;
pub mod queue;

pub use health::health_routes;
pub use queue::queue_routes;
