//! SQLite-backed persistence: connection setup, embedded migrations, and
//! the `TaskStore` adapter.

pub mod connection;
pub mod migrations;
pub mod sqlite_task_store;

pub use connection::connect;
pub use migrations::Migrator;
pub use sqlite_task_store::SqliteTaskStore;
