//! Domain model（handles, statuses, errors, parameters, results）

pub mod errors;
pub mod ids;
pub mod params;
pub mod pending;
pub mod status;
pub mod structural;

pub use self::errors::{ProtocolViolation, TetherError};
pub use self::ids::{CommandHandle, SessionId};
pub use self::params::{JsonParameterSet, ParamValue, serialize};
pub use self::pending::{PendingOperation, PendingResult};
pub use self::status::{
    ErrorKind, RawStatus, SUCCESS_CODE, check_result, complete_or_fail, fail_with_status,
    is_success, translate,
};
pub use self::structural::{FieldDisplay, PendingSummary, StructuralResult};
