//! Ledger-backed schema migrations.
//!
//! Migration units are plain SQL files named `<version>_<description>.sql`.
//! They are applied in ascending version order, each inside its own
//! transaction, and recorded in the `schema_version` table of the target
//! database so that every unit runs exactly once.

mod error;
mod runner;
mod unit;

pub use error::MigrationError;
pub use runner::{AppliedMigration, MigrationReport, MigrationStatus, Migrator, LEDGER_TABLE};
pub use unit::{MigrationSet, MigrationUnit};
