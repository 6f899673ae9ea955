//! # TusaBot Ops
//!
//! Storage, schema migration and deployment tooling for the TusaBot
//! event-registration Telegram bot.
//!
//! ## Features
//! - Versioned SQL schema for users, event posters and attendance marks
//! - Ledger-backed migration runner that applies each unit exactly once
//! - Deployment orchestrator driving stop, sync, migrate and restart of the bot service
//! - Persistent storage with SQLite

/// Configuration management and environment variables
pub mod config;
/// Database models, connections, and migrations
pub mod database;
/// Deployment lifecycle of the bot service process
pub mod deploy;
/// Logging helpers and small formatting utilities
pub mod utils;
