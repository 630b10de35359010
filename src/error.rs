//! Error types for netwarden.

use thiserror::Error;

/// Errors raised by the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed record in '{collection}': {message}")]
    Malformed { collection: String, message: String },
}

/// Errors raised by the control plane (compiler, drivers, routes, NAT).
///
/// Every variant that originates from a host tool keeps the raw diagnostic
/// text so operators can correlate it with the tool's own behavior.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Input rejected before any host mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external mechanism exited non-zero (or could not be started).
    #[error("{program} failed: {stderr}")]
    CommandExecution {
        program: String,
        stderr: String,
        code: Option<i32>,
    },

    /// The primary mechanism does not exist on this host.
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Old host state was removed but the replacement could not be applied.
    /// The host is left without the protection the handle used to provide.
    #[error("Partial update of '{handle}': old state removed, new state not applied: {source}")]
    PartialUpdate {
        handle: String,
        #[source]
        source: Box<ControlError>,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ControlError {
    pub fn validation(message: impl Into<String>) -> Self {
        ControlError::Validation(message.into())
    }

    /// Raw backend diagnostic text, if this error carries any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            ControlError::CommandExecution { stderr, .. } => Some(stderr),
            ControlError::CapabilityNotFound(text) => Some(text),
            ControlError::PartialUpdate { source, .. } => source.diagnostic(),
            _ => None,
        }
    }

    /// True when a remove-then-add sequence left the host unprotected.
    pub fn is_partial_update(&self) -> bool {
        matches!(self, ControlError::PartialUpdate { .. })
    }
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display_keeps_stderr() {
        let err = ControlError::CommandExecution {
            program: "iptables".to_string(),
            stderr: "iptables: No chain/target/match by that name.".to_string(),
            code: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "iptables failed: iptables: No chain/target/match by that name."
        );
        assert_eq!(
            err.diagnostic(),
            Some("iptables: No chain/target/match by that name.")
        );
    }

    #[test]
    fn test_partial_update_exposes_inner_diagnostic() {
        let err = ControlError::PartialUpdate {
            handle: "web".to_string(),
            source: Box::new(ControlError::CommandExecution {
                program: "powershell".to_string(),
                stderr: "access denied".to_string(),
                code: Some(1),
            }),
        };
        assert!(err.is_partial_update());
        assert_eq!(err.diagnostic(), Some("access denied"));
        assert!(err.to_string().contains("'web'"));
    }

    #[test]
    fn test_validation_has_no_diagnostic() {
        let err = ControlError::validation("bad mask");
        assert!(err.diagnostic().is_none());
        assert!(!err.is_partial_update());
    }
}
