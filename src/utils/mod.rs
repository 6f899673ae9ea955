/// Consistent log line formats
pub mod logging;
/// Credential masking for operator-facing output
pub mod mask;
