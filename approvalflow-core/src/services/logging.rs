//! Logging service

use crate::models::LogLevel;

/// Initialize logging with the specified level
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => directives,
        _ => default_directive(level).to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}

fn default_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "approvalflow=error,approvalflow_core=error",
        LogLevel::Warn => "approvalflow=warn,approvalflow_core=warn",
        LogLevel::Info => "approvalflow=info,approvalflow_core=info",
        LogLevel::Debug => "approvalflow=debug,approvalflow_core=debug",
        LogLevel::Trace => "approvalflow=trace,approvalflow_core=trace",
    }
}

/// Log a refused operation (always logged at warn)
pub fn log_refusal(operation: &str, actor: &str, reason: &str) {
    tracing::warn!(
        operation = operation,
        actor = actor,
        reason = reason,
        "Operation refused"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert!(default_directive(LogLevel::Debug).contains("approvalflow_core=debug"));
        assert!(default_directive(LogLevel::Error).starts_with("approvalflow=error"));
    }

    #[test]
    fn test_logging_initialization() {
        // A second initialization in the same process reports an error instead of panicking
        let _ = init_logging(LogLevel::Info);
        let _ = init_logging(LogLevel::Info);
        log_refusal("decide", "tester", "test reason");
    }
}
