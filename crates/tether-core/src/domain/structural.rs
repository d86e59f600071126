//! StructuralResult - value semantics for plain result objects.
//!
//! Result objects handed back to callers are field-only structs. Equality and
//! hashing are structural over every declared field, and `Display` renders a
//! compact diagnostic form:
//!
//! ```text
//! ConnectionState[handle=7,state=4,detail=<null>]
//! ```
//!
//! Everything is generated at compile time by [`structural_result!`]: the
//! comparison and hash come from derives, the display from a field list the
//! macro expands in declaration order. Values of different result types never
//! compare equal because they are different Rust types.
//!
//! The display form is for logs and test failures only. It is not a wire format.

use chrono::{DateTime, Utc};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use super::ids::{CommandHandle, SessionId};
use super::status::ErrorKind;

/// Implemented by every type declared through [`structural_result!`].
pub trait StructuralResult: Clone + Eq + Hash + Debug + Display {
    const TYPE_NAME: &'static str;
    /// Declared field names, in declaration order.
    const FIELD_NAMES: &'static [&'static str];
}

/// How a single field value is rendered inside `TypeName[...]`.
pub trait FieldDisplay {
    fn fmt_field(&self, f: &mut Formatter<'_>) -> fmt::Result;
}

macro_rules! field_display_via_display {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FieldDisplay for $ty {
                fn fmt_field(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    Display::fmt(self, f)
                }
            }
        )+
    };
}

field_display_via_display!(
    String, str, bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize,
    CommandHandle, SessionId, ErrorKind, DateTime<Utc>,
);

impl<T: FieldDisplay + ?Sized> FieldDisplay for &T {
    fn fmt_field(&self, f: &mut Formatter<'_>) -> fmt::Result {
        (**self).fmt_field(f)
    }
}

impl<T: FieldDisplay> FieldDisplay for Option<T> {
    fn fmt_field(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Some(value) => value.fmt_field(f),
            None => f.write_str("<null>"),
        }
    }
}

impl<T: FieldDisplay> FieldDisplay for Vec<T> {
    fn fmt_field(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            value.fmt_field(f)?;
        }
        f.write_str("}")
    }
}

/// Declare a plain result struct with structural equality, hash and display.
///
/// ```
/// tether_core::structural_result! {
///     /// State of a connection after an update.
///     pub struct ConnectionState {
///         pub handle: u32,
///         pub state: u32,
///     }
/// }
///
/// let s = ConnectionState { handle: 7, state: 4 };
/// assert_eq!(s.to_string(), "ConnectionState[handle=7,state=4]");
/// ```
///
/// Every field type must implement `Clone + Eq + Hash + Debug` and
/// [`FieldDisplay`].
#[macro_export]
macro_rules! structural_result {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )+
        }

        impl $crate::domain::StructuralResult for $name {
            const TYPE_NAME: &'static str = stringify!($name);
            const FIELD_NAMES: &'static [&'static str] = &[$(stringify!($field)),+];
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let values: &[&dyn $crate::domain::FieldDisplay] = &[$(&self.$field),+];
                let names = <Self as $crate::domain::StructuralResult>::FIELD_NAMES;

                f.write_str(concat!(stringify!($name), "["))?;
                for (i, (name, value)) in names.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{name}=")?;
                    $crate::domain::FieldDisplay::fmt_field(*value, f)?;
                }
                f.write_str("]")
            }
        }
    };
}

structural_result! {
    /// Snapshot of one outstanding registry entry.
    #[derive(serde::Serialize)]
    pub struct PendingSummary {
        pub handle: CommandHandle,
        pub operation: &'static str,
        pub payload_type: &'static str,
        pub registered_at: DateTime<Utc>,
    }
}
