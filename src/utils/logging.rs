use tracing::{debug, error, info, warn};

/// Logs the start of a deployment step with consistent format
pub fn log_step_start(step: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("STEP_START: {} - {}", step, d),
        None => info!("STEP_START: {}", step),
    }
}

/// Logs a completed deployment step with consistent format
pub fn log_step_success(step: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("STEP_OK: {} - {}", step, d),
        None => info!("STEP_OK: {}", step),
    }
}

/// Logs a best-effort step whose failure does not stop the deployment
pub fn log_step_tolerated(step: &str, error: &str) {
    warn!("STEP_TOLERATED: {} failed but deployment continues - {}", step, error);
}

/// Logs a step that was not attempted
pub fn log_step_skipped(step: &str, reason: &str) {
    info!("STEP_SKIPPED: {} - {}", step, reason);
}

/// Logs a failed deployment step with consistent format
pub fn log_step_failed(step: &str, error: &str) {
    error!("STEP_FAILED: {} - {}", step, error);
}

/// Logs an applied migration unit
pub fn log_migration_applied(version: i64, description: &str, execution_ms: i64) {
    info!("MIGRATION: applied {} ({}) in {}ms", version, description, execution_ms);
}

/// Logs a migration unit that was already recorded in the ledger
pub fn log_migration_skipped(version: i64, description: &str) {
    debug!("MIGRATION: {} ({}) already applied", version, description);
}

/// Logs a migration unit that failed to apply
pub fn log_migration_failed(version: i64, description: &str, error: &str) {
    error!("MIGRATION: {} ({}) failed: {}", version, description, error);
}

/// Logs database operations with consistent format
pub fn log_database_operation(operation: &str, table: &str, details: Option<&str>) {
    match details {
        Some(d) => debug!("DB_OP: {} on {} - {}", operation, table, d),
        None => debug!("DB_OP: {} on {}", operation, table),
    }
}

/// Logs database errors with consistent format
pub fn log_database_error(operation: &str, table: &str, error: &str, details: Option<&str>) {
    match details {
        Some(d) => error!("DB_ERROR: {} on {} failed: {} - {}", operation, table, error, d),
        None => error!("DB_ERROR: {} on {} failed: {}", operation, table, error),
    }
}

/// Logs system events with consistent format
pub fn log_system_event(event: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("SYSTEM: {} - {}", event, d),
        None => info!("SYSTEM: {}", event),
    }
}
