// SPDX-License-Identifier: Apache-2.0
//! Dotted-path configuration binding over a `serde_json::Value` tree.
//!
//! The source system binds configuration into reflected struct fields by
//! walking a tag-derived dotted path. There is no struct reflection here, so
//! the tree itself is the value: a [`Configuration`] wraps whatever
//! `serde_json::Value` the external YAML/JSON loader (out of scope; see
//! `infrastructure::collaborators`) produced, and [`Dependencies::config`]
//! fields are resolved by walking it.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config path '{path}': cannot coerce {found} to {want}")]
    TypeMismatch {
        path: String,
        want: &'static str,
        found: &'static str,
    },
}

/// A read-only configuration tree, addressed by dotted path.
#[derive(Debug, Clone)]
pub struct Configuration {
    root: Value,
}

impl Configuration {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Walk a dotted path (`"storage.backup.concurrency"`). Each segment is
    /// matched against the current object's keys case-insensitively on its
    /// final component only — intermediate segments must match exactly,
    /// matching the binder's "last-segment case-insensitive" rule.
    ///
    /// A path that does not resolve (missing key, or walking through a
    /// non-object) returns `None`: the caller leaves the field at its zero
    /// value, this is not an error.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Some(&self.root);
        }
        let mut current = &self.root;
        let last_index = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let object = current.as_object()?;
            let found = if i == last_index {
                object
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(segment))
                    .map(|(_, v)| v)
            } else {
                object.get(*segment)
            };
            current = found?;
        }
        Some(current)
    }

    /// Bind a path to `T`, leaving the default (`T: Default`) if the path is
    /// absent, or failing with [`ConfigError::TypeMismatch`] if present but
    /// not coercible.
    pub fn bind<T>(&self, path: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.get_path(path) {
            None => Ok(T::default()),
            Some(value) => coerce(value, std::any::type_name::<T>())
                .map_err(|_| ConfigError::TypeMismatch {
                    path: path.to_string(),
                    want: std::any::type_name::<T>(),
                    found: type_tag(value),
                }),
        }
    }
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Best-effort coercion used by both [`Configuration::bind`] and
/// [`crate::domain::activity::Dependencies::config`] setters.
///
/// Tries, in order: a direct `serde_json` deserialize (covers structs,
/// slices, numbers-to-numbers, strings-to-strings); then, if `T` is a
/// `String`-shaped leaf and the source value is a string that looks like a
/// duration (`"30s"`, `"5m"`), a `humantime` parse into the duration's
/// component form is attempted by the caller (durations are deserialized as
/// `std::time::Duration` via the `humantime_serde`-style pattern below).
pub fn coerce<T: DeserializeOwned>(value: &Value, type_name: &'static str) -> Result<T, ConfigError> {
    // Strings that parse as humantime durations are retried through
    // humantime before falling back to plain deserialization, so that both
    // `duration: "30s"` (string config) and a literal seconds count bind into
    // `std::time::Duration` fields.
    if type_name.contains("Duration") {
        if let Value::String(s) = value {
            if let Ok(d) = humantime::parse_duration(s) {
                if let Ok(v) = serde_json::to_value(d) {
                    if let Ok(parsed) = serde_json::from_value(v) {
                        return Ok(parsed);
                    }
                }
            }
        }
    }
    serde_json::from_value(value.clone()).map_err(|_| ConfigError::TypeMismatch {
        path: String::new(),
        want: type_name,
        found: type_tag(value),
    })
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
