//! Errors - the failure taxonomy of the correlation layer.
//!
//! - `NativeCall` / `AsyncOperation`: the native library said no. Recoverable,
//!   always delivered as the terminal state of the caller's future (or returned
//!   from the blocking entry points).
//! - `ProtocolViolation`: allocator, registry and native layer disagree about
//!   which handles are live. A correctness bug, never a runtime condition.
//! - `InvalidParameterType`: a caller tried to put something that is not a JSON
//!   scalar into a parameter set.

use thiserror::Error;

use super::ids::CommandHandle;
use super::status::{ErrorKind, RawStatus};

#[derive(Debug, Error)]
pub enum TetherError {
    #[error("native call `{operation}` rejected: {kind} (code {code})")]
    NativeCall {
        operation: &'static str,
        kind: ErrorKind,
        code: RawStatus,
    },

    #[error("operation `{operation}` failed: {kind} (code {code}){}", detail_suffix(.detail))]
    AsyncOperation {
        operation: &'static str,
        kind: ErrorKind,
        code: RawStatus,
        detail: Option<String>,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("invalid parameter type for `{key}`: {found}")]
    InvalidParameterType { key: String, found: String },

    #[error("command handle space exhausted")]
    HandleSpaceExhausted,

    #[error("{0} was dropped before its callback arrived")]
    Abandoned(CommandHandle),
}

/// Correlation-table invariant breaches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("{0} is already registered")]
    DuplicateHandle(CommandHandle),

    #[error("{0} is not registered (never issued or already resolved)")]
    UnknownHandle(CommandHandle),

    #[error("{handle} was registered for `{registered}` but completed as `{delivered}`")]
    PayloadTypeMismatch {
        handle: CommandHandle,
        registered: &'static str,
        delivered: &'static str,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

impl TetherError {
    /// The symbolic kind for errors that came from a native status.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TetherError::NativeCall { kind, .. } | TetherError::AsyncOperation { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }

    /// The raw native status for errors that came from one.
    pub fn raw_code(&self) -> Option<RawStatus> {
        match self {
            TetherError::NativeCall { code, .. } | TetherError::AsyncOperation { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, TetherError::ProtocolViolation(_))
    }

    pub(crate) fn invalid_parameter(key: impl Into<String>, found: impl Into<String>) -> Self {
        TetherError::InvalidParameterType {
            key: key.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_error_message_includes_detail() {
        let err = TetherError::AsyncOperation {
            operation: "connect",
            kind: ErrorKind::NoEndpoint,
            code: 1006,
            detail: Some("agency unreachable".into()),
        };
        assert_eq!(
            err.to_string(),
            "operation `connect` failed: NO_ENDPOINT (code 1006): agency unreachable"
        );
    }

    #[test]
    fn async_error_message_without_detail() {
        let err = TetherError::AsyncOperation {
            operation: "connect",
            kind: ErrorKind::NoEndpoint,
            code: 1006,
            detail: None,
        };
        assert_eq!(err.to_string(), "operation `connect` failed: NO_ENDPOINT (code 1006)");
    }

    #[test]
    fn violation_converts_into_tether_error() {
        let err: TetherError = ProtocolViolation::UnknownHandle(CommandHandle::from_raw(9)).into();
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("cmd-9"));
        assert_eq!(err.kind(), None);
        assert_eq!(err.raw_code(), None);
    }
}
