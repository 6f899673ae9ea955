/// Connection pool setup
pub mod connection;
/// Migration discovery, ordering and application
pub mod migrations;
/// Typed access to the bot's tables
pub mod models;
