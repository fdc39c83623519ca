//! Fatal error taxonomy and process exit codes.
//!
//! Only conditions that abort the whole run live here. Per-decision write
//! failures are logged by the applicator and never surface as a `SyncError`.

use thiserror::Error;

/// Exit codes for the sync job
/// - 0: Run completed (possibly with per-decision failures)
/// - 2: Required environment variables missing
/// - 3: Configuration file invalid
/// - 4: vCenter inventory could not be loaded
/// - 5: NetBox inventory could not be loaded
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Required environment variables are not set: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("vCenter inventory unavailable: {0:#}")]
    SourceUnavailable(#[source] anyhow::Error),

    #[error("NetBox inventory unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl SyncError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::MissingEnv(_) => 2,
            SyncError::Config(_) => 3,
            SyncError::SourceUnavailable(_) => 4,
            SyncError::StoreUnavailable(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            SyncError::MissingEnv(vec!["NETBOX_API_TOKEN".to_string()]),
            SyncError::Config("bad".to_string()),
            SyncError::SourceUnavailable(anyhow::anyhow!("down")),
            SyncError::StoreUnavailable(anyhow::anyhow!("down")),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn test_unavailable_errors_expose_their_cause() {
        use std::error::Error as _;

        let cause =
            anyhow::anyhow!("connection refused").context("Failed to list NetBox clusters");
        let err = SyncError::StoreUnavailable(cause);

        let source = err.source().expect("cause is attached");
        assert_eq!(source.to_string(), "Failed to list NetBox clusters");
        assert!(err.to_string().contains("connection refused"));
        assert!(SyncError::Config("bad".to_string()).source().is_none());
    }

    #[test]
    fn test_missing_env_message_lists_variables() {
        let err = SyncError::MissingEnv(vec![
            "VCENTER_HOSTNAME".to_string(),
            "NETBOX_API_URI".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Required environment variables are not set: VCENTER_HOSTNAME, NETBOX_API_URI"
        );
    }
}
