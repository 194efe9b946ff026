// SPDX-License-Identifier: Apache-2.0
//! Activity identity: the sole cross-component key for an activity.

use std::fmt;

/// Uniquely names an activity by `(module, type)`.
///
/// Stable for the process lifetime; two identities are equal iff both halves
/// are equal. There is no reflection in Rust, so identities are not derived
/// by inspecting a value's concrete type at runtime — each `Activity` impl
/// reports its own identity via [`crate::domain::activity::Activity::identity`],
/// which conventionally returns `ActivityIdentity::new(module_path!(), "TypeName")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityIdentity {
    module: String,
    type_name: String,
}

impl ActivityIdentity {
    /// Build an identity from a module path and a type name. Both must be non-empty.
    pub fn new(module: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            type_name: type_name.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `module.type`, e.g. `backup::activities.BackupVMs`.
    pub fn long_string(&self) -> String {
        format!("{}.{}", self.module, self.type_name)
    }

    /// Like [`Self::long_string`], but `module` is truncated to its last `::`-segment.
    pub fn short_string(&self) -> String {
        let last_segment = self.module.rsplit("::").next().unwrap_or(&self.module);
        format!("{}.{}", last_segment, self.type_name)
    }

    /// Both halves must be non-empty for an identity to be usable as a graph/registry key.
    pub fn is_valid(&self) -> bool {
        !self.module.is_empty() && !self.type_name.is_empty()
    }
}

impl fmt::Display for ActivityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.long_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_string_round_trips_on_last_dot_split() {
        let id = ActivityIdentity::new("backup::activities", "BackupVMs");
        let s = id.long_string();
        let (module, type_name) = s.rsplit_once('.').unwrap();
        assert_eq!(module, "backup::activities");
        assert_eq!(type_name, "BackupVMs");
    }

    #[test]
    fn short_string_uses_last_path_segment() {
        let id = ActivityIdentity::new("backup::activities::power", "PowerOnPBS");
        assert_eq!(id.short_string(), "power.PowerOnPBS");
    }

    #[test]
    fn validity_requires_both_halves() {
        assert!(ActivityIdentity::new("m", "T").is_valid());
        assert!(!ActivityIdentity::new("", "T").is_valid());
        assert!(!ActivityIdentity::new("m", "").is_valid());
    }

    #[test]
    fn equality_is_componentwise() {
        let a = ActivityIdentity::new("m", "T");
        let b = ActivityIdentity::new("m", "T");
        let c = ActivityIdentity::new("m", "U");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
