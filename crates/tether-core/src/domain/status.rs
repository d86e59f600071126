//! Status - ネイティブの raw status code とその分類
//!
//! ネイティブライブラリは結果をすべて素の `u32` で返す。このモジュールは
//! 対応表と、status を pending operation の終端状態に変換する helper を持つ。
//!
//! # 全域性
//! [`translate`] は失敗しない。表にないコードは [`ErrorKind::Unknown`] になる。
//! [`TetherError`] には kind と一緒に raw code も入るので情報は失われない。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::TetherError;
use super::pending::PendingOperation;

/// Status code as returned by a native entry point or callback.
pub type RawStatus = u32;

/// Status the native layer uses for success.
pub const SUCCESS_CODE: RawStatus = 0;

macro_rules! error_kinds {
    ($( $(#[$meta:meta])* $variant:ident = $code:literal => $name:literal, )+) => {
        /// Symbolic classification of a native status code.
        ///
        /// `Success` is the sentinel; `Unknown` doubles as the catch-all for
        /// codes not present in the table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ErrorKind {
            $(
                $(#[$meta])*
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl ErrorKind {
            /// Every kind, in table order.
            pub const ALL: &'static [ErrorKind] = &[$(ErrorKind::$variant),+];

            fn from_code(code: RawStatus) -> Option<Self> {
                match code {
                    $( $code => Some(ErrorKind::$variant), )+
                    _ => None,
                }
            }

            /// Canonical native code for this kind.
            pub const fn code(self) -> RawStatus {
                match self {
                    $( ErrorKind::$variant => $code, )+
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $( ErrorKind::$variant => $name, )+
                }
            }
        }
    };
}

error_kinds! {
    Success = 0 => "SUCCESS",
    /// Unrecognized codes land here too.
    Unknown = 1001 => "UNKNOWN_ERROR",
    Connection = 1002 => "CONNECTION_ERROR",
    InvalidConnectionHandle = 1003 => "INVALID_CONNECTION_HANDLE",
    InvalidConfiguration = 1004 => "INVALID_CONFIGURATION",
    NotReady = 1005 => "NOT_READY",
    NoEndpoint = 1006 => "NO_ENDPOINT",
    InvalidOption = 1007 => "INVALID_OPTION",
    InvalidDid = 1008 => "INVALID_DID",
    InvalidVerkey = 1009 => "INVALID_VERKEY",
    PostMessageFailure = 1010 => "POST_MSG_FAILURE",
    InvalidNonce = 1011 => "INVALID_NONCE",
    InvalidKeyDelegate = 1012 => "INVALID_KEY_DELEGATE",
    InvalidUrl = 1013 => "INVALID_URL",
    NotBase58 = 1014 => "NOT_BASE58",
    InvalidIssuerCredentialHandle = 1015 => "INVALID_ISSUER_CREDENTIAL_HANDLE",
    InvalidJson = 1016 => "INVALID_JSON",
    InvalidProofHandle = 1017 => "INVALID_PROOF_HANDLE",
    InvalidCredentialRequest = 1018 => "INVALID_CREDENTIAL_REQUEST",
    InvalidMsgpack = 1019 => "INVALID_MSGPACK",
    InvalidMessages = 1020 => "INVALID_MESSAGES",
    InvalidAttributesStructure = 1021 => "INVALID_ATTRIBUTES_STRUCTURE",
    BigNumber = 1022 => "BIG_NUMBER_ERROR",
    InvalidProof = 1023 => "INVALID_PROOF",
    InvalidGenesisTxnPath = 1024 => "INVALID_GENESIS_TXN_PATH",
    CreatePoolConfigParameters = 1025 => "CREATE_POOL_CONFIG_PARAMETERS",
    CreatePoolConfig = 1026 => "CREATE_POOL_CONFIG",
    InvalidProofCredentialData = 1027 => "INVALID_PROOF_CREDENTIAL_DATA",
    IndySubmitRequest = 1028 => "INDY_SUBMIT_REQUEST_ERROR",
    BuildCredentialDefRequest = 1029 => "BUILD_CREDENTIAL_DEF_REQ_ERR",
    NoPoolOpen = 1030 => "NO_POOL_OPEN",
    InvalidSchema = 1031 => "INVALID_SCHEMA",
}

impl ErrorKind {
    pub fn is_success(self) -> bool {
        self == ErrorKind::Success
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a raw status. Total: unrecognized codes become `Unknown`.
pub fn translate(raw: RawStatus) -> ErrorKind {
    ErrorKind::from_code(raw).unwrap_or(ErrorKind::Unknown)
}

pub fn is_success(raw: RawStatus) -> bool {
    translate(raw).is_success()
}

/// Check the immediate status of a native entry point that has no callback.
pub fn check_result(operation: &'static str, raw: RawStatus) -> Result<(), TetherError> {
    if is_success(raw) {
        Ok(())
    } else {
        Err(TetherError::NativeCall {
            operation,
            kind: translate(raw),
            code: raw,
        })
    }
}

/// Complete `operation` from a callback's status and payload.
///
/// A success status resolves the future with `payload`; anything else fails it
/// with [`TetherError::AsyncOperation`] and the payload is dropped.
///
/// The only error returned here is a payload type mismatch, which means the
/// callback was wired to the wrong operation.
pub fn complete_or_fail<T: Send + 'static>(
    operation: PendingOperation,
    raw: RawStatus,
    payload: T,
    detail: Option<String>,
) -> Result<(), TetherError> {
    let result = if is_success(raw) {
        Ok(payload)
    } else {
        Err(TetherError::AsyncOperation {
            operation: operation.operation(),
            kind: translate(raw),
            code: raw,
            detail,
        })
    };
    operation.complete(result)
}

/// Fail `operation` from a callback that delivered no payload.
///
/// A success status with no payload is itself a broken callback and is
/// reported as `Unknown`.
pub fn fail_with_status(operation: PendingOperation, raw: RawStatus, detail: Option<String>) {
    let kind = match translate(raw) {
        ErrorKind::Success => ErrorKind::Unknown,
        kind => kind,
    };
    let error = TetherError::AsyncOperation {
        operation: operation.operation(),
        kind,
        code: raw,
        detail,
    };
    operation.fail(error);
}
