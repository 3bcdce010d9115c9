pub mod constants;
pub mod db;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod models;
pub mod registry;
pub mod services;
pub mod session;
pub mod store;
pub mod utils;

pub use db::get_db_pool;
pub use error::{ConnectError, ConnectResult};
pub use utils::config::Config;

// Re-export common types
pub use chrono::{DateTime, Utc};
pub use sqlx::PgPool;
pub use uuid::Uuid;
