//! SQLite adapter for task persistence.

mod connection;
mod migrations;
mod models;
mod repository;
mod schema;

pub use connection::{establish, open_connection};
pub use migrations::{CURRENT_SCHEMA_VERSION, migrate_schema, schema_version};
pub use models::format_timestamp;
pub use repository::SqliteTaskRepository;
