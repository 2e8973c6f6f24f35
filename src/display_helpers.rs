use std::fmt::Display;

use serde::Serializer;

/// Serialize a value as its display string. Used for apollo-compiler values
/// (types, argument values) that have no `Serialize` impl of their own.
pub(crate) fn serialize_as_string<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
