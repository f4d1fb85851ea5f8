//! Runtime errors

use thiserror::Error;

use jac_foundation::{ArchKind, ElementId, ValueError};
use jac_ir::IrError;
use jac_store::StoreError;
use jac_vm::MachineError;

/// Runtime result type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors
///
/// Program faults (`is_recoverable`) are caught at the statement that raised
/// them and recorded on the walker, or handed to an enclosing `try`. Everything
/// else unwinds to the walker's `run`, which turns it into a failed report.
#[derive(Debug, Error)]
pub enum Error {
    /// A program fault with a ready-made message.
    #[error("{0}")]
    Runtime(String),

    #[error("Jac Assert Failed for condition: {0}")]
    AssertFailed(String),

    #[error("Unable to find architype {kind}::{name}, cannot resolve its has_vars")]
    ArchitypeNotFound { kind: ArchKind, name: String },

    #[error("{0}")]
    Value(#[from] ValueError),

    #[error("action {0} not loaded")]
    ActionNotFound(String),

    #[error("{action}: {reason}")]
    Action { action: String, reason: String },

    #[error("element {0} not found or not accessible")]
    ElementNotFound(ElementId),

    #[error("sentinel {0} not found")]
    SentinelNotFound(ElementId),

    #[error("no active sentinel for master {0}")]
    NoActiveSentinel(ElementId),

    #[error("sentinel {0} is not active")]
    InactiveSentinel(ElementId),

    #[error("no graph to start from for master {0}")]
    NoGraph(ElementId),

    #[error("invalid bytecode: {0}")]
    Machine(MachineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("Invalid runtime config: {0}")]
    Config(String),

    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Shorthand for a program fault.
    pub fn rt(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Whether the fault belongs to the running program rather than the host.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Runtime(_)
                | Error::AssertFailed(_)
                | Error::ArchitypeNotFound { .. }
                | Error::Value(_)
                | Error::ActionNotFound(_)
                | Error::Action { .. }
                | Error::ElementNotFound(_)
        )
    }

    /// Short type tag exposed to `try` handlers.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Runtime(_) => "RuntimeError",
            Error::AssertFailed(_) => "AssertionError",
            Error::ArchitypeNotFound { .. } => "ArchitypeNotFound",
            Error::Value(ValueError::DivisionByZero) => "ZeroDivisionError",
            Error::Value(ValueError::Lookup(_)) => "LookupError",
            Error::Value(_) => "TypeError",
            Error::ActionNotFound(_) | Error::Action { .. } => "ActionError",
            Error::ElementNotFound(_) => "ElementNotFound",
            _ => "InternalError",
        }
    }
}

impl From<MachineError> for Error {
    fn from(err: MachineError) -> Self {
        match err {
            MachineError::Value(value) => Error::Value(value),
            other => Error::Machine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_value_errors_stay_recoverable() {
        let err: Error = MachineError::Value(ValueError::DivisionByZero).into();
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), "ZeroDivisionError");

        let err: Error = MachineError::BadHeader.into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_missing_architype_mentions_has_vars() {
        let err = Error::ArchitypeNotFound {
            kind: ArchKind::Node,
            name: "testnode".into(),
        };
        assert!(err.to_string().contains("has_var"));
    }
}
