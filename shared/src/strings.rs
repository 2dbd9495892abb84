//! Stream string table.
//!
//! Strings are sent once per stream in a `StringHandleEvent`; every later
//! event refers to them by handle. Handles are only meaningful inside the
//! stream that registered them.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error};

/// Value returned for any handle the stream never registered
pub const INVALID_STRING: &str = "<invalid>";

/// Stream-local string handle. `0` is the null handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringHandle(pub u32);

impl StringHandle {
    pub const NULL: StringHandle = StringHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (namespace, name) handle pair identifying a class, type or message.
///
/// Kept as its own type so a bare [`StringHandle`] can never be resolved as a
/// pair with one side silently missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: StringHandle,
    pub name: StringHandle,
}

impl NamespacedName {
    pub fn new(namespace: u32, name: u32) -> Self {
        Self {
            namespace: StringHandle(namespace),
            name: StringHandle(name),
        }
    }
}

/// A [`NamespacedName`] with both handles resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedName<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
}

impl fmt::Display for ResolvedName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}.{}]", self.namespace, self.name)
    }
}

/// Append-only handle → string map built as a stream is decoded
#[derive(Debug, Default)]
pub struct StringTable {
    strings: HashMap<u32, String>,
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            strings: HashMap::with_capacity(1024),
        }
    }

    /// Bind `value` to `handle`. The first binding of a handle wins.
    pub fn insert(&mut self, handle: StringHandle, value: impl Into<String>) {
        let value = value.into();
        match self.strings.get(&handle.0) {
            Some(existing) => {
                debug!(
                    "ignoring rebinding of string handle {} ({:?} -> {:?})",
                    handle, existing, value
                );
            }
            None => {
                self.strings.insert(handle.0, value);
            }
        }
    }

    /// Resolve a single handle. Unknown handles resolve to [`INVALID_STRING`].
    pub fn lookup(&self, handle: StringHandle) -> &str {
        match self.strings.get(&handle.0) {
            Some(s) => s.as_str(),
            None => {
                error!("invalid string handle found : {}", handle);
                INVALID_STRING
            }
        }
    }

    /// Resolve both halves of a namespaced name
    pub fn resolve(&self, name: &NamespacedName) -> ResolvedName<'_> {
        ResolvedName {
            namespace: self.lookup(name.namespace),
            name: self.lookup(name.name),
        }
    }

    pub fn contains(&self, handle: StringHandle) -> bool {
        self.strings.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_registered_and_missing() {
        let mut table = StringTable::new();
        table.insert(StringHandle(7), "PxTriangleMesh");

        assert_eq!(table.lookup(StringHandle(7)), "PxTriangleMesh");
        assert_eq!(table.lookup(StringHandle(8)), INVALID_STRING);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_first_binding_wins() {
        let mut table = StringTable::new();
        table.insert(StringHandle(1), "first");
        table.insert(StringHandle(1), "second");

        assert_eq!(table.lookup(StringHandle(1)), "first");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_namespaced_name() {
        let mut table = StringTable::new();
        table.insert(StringHandle(1), "Geom");
        table.insert(StringHandle(2), "Box");

        let resolved = table.resolve(&NamespacedName::new(1, 2));
        assert_eq!(resolved.namespace, "Geom");
        assert_eq!(resolved.name, "Box");
        assert_eq!(resolved.to_string(), "[Geom.Box]");
    }

    #[test]
    fn test_resolve_with_missing_half() {
        let mut table = StringTable::new();
        table.insert(StringHandle(2), "Box");

        let resolved = table.resolve(&NamespacedName::new(9, 2));
        assert_eq!(resolved.namespace, INVALID_STRING);
        assert_eq!(resolved.name, "Box");
    }
}
