//! value coercion for config documents
//!
//! Config documents arrive as generic [serde_yaml::Value] trees. The resolved model only knows a few shapes:
//! - mapping (string keys, order-preserving)
//! - scalar, coerced to a string when it becomes a variable
//!   - string: as-is
//!   - number: decimal representation
//!   - boolean: `true`/`false`
//!   - null: empty string
//! - permission bits (integer, or octal string)
//!
//! Everything else where one of those is expected is reported as [ConfigError::InvalidShape].
use crate::config::ConfigError;
use serde_yaml::{Mapping, Value};

/// Borrow `value` as a mapping
///
/// `null` counts as an empty mapping, so `environments:` with nothing below it is not an error.
pub fn as_mapping<'v>(
    value: &'v Value,
    origin: &str,
    key: &str,
) -> Result<Option<&'v Mapping>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::Mapping(mapping) => Ok(Some(mapping)),
        Value::Tagged(tagged) => as_mapping(&tagged.value, origin, key),
        other => Err(ConfigError::invalid_shape(origin, key, "mapping", other)),
    }
}

/// Coerce a scalar to its string form
pub fn to_string(value: &Value, origin: &str, key: &str) -> Result<String, ConfigError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Tagged(tagged) => to_string(&tagged.value, origin, key),
        other => Err(ConfigError::invalid_shape(origin, key, "scalar", other)),
    }
}

/// Mapping keys are scalars too, but `null` or nested keys make no sense as names
pub fn key_to_string(key: &Value, origin: &str) -> Result<String, ConfigError> {
    match key {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => to_string(key, origin, ""),
        other => Err(ConfigError::invalid_shape(origin, "<key>", "scalar key", other)),
    }
}

/// Permission bits
///
/// Integers are taken as the mode itself (`420` is `0o644`), strings are read as octal with an optional `0o` prefix.
pub fn to_perms(value: &Value, origin: &str, key: &str) -> Result<u32, ConfigError> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ConfigError::invalid_shape(origin, key, "permission bits", value)),
        Value::String(s) => {
            let digits = s.trim();
            let digits = digits.strip_prefix("0o").unwrap_or(digits);
            u32::from_str_radix(digits, 8)
                .map_err(|_| ConfigError::invalid_shape(origin, key, "octal permission bits", value))
        }
        Value::Tagged(tagged) => to_perms(&tagged.value, origin, key),
        other => Err(ConfigError::invalid_shape(origin, key, "permission bits", other)),
    }
}

/// Short human readable name of a value's kind, for error messages
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
