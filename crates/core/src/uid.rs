// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UID generation for queue items and state-snapshot tokens.
//!
//! All manager-assigned UIDs are opaque, collision-resistant strings of the
//! form `{prefix}{nanoid}`. Run UIDs are produced by the worker's run engine
//! (uuid strings) and are kept as plain `String`s.

/// Maximum byte length for an inline UID.
///
/// Generated UIDs are exactly 23 bytes (4-char prefix + 19-char nanoid).
/// `from_string` accepts shorter UIDs but debug-asserts they fit.
pub const UID_MAX_LEN: usize = 23;

/// Fixed-size inline UID buffer. Always ≤ 23 ASCII bytes, `Copy`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UidBuf {
    len: u8,
    buf: [u8; UID_MAX_LEN],
}

impl std::hash::Hash for UidBuf {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash only the active bytes so it matches str::hash,
        // which is required for Borrow<str> set lookups.
        self.as_str().hash(state);
    }
}

impl UidBuf {
    pub fn new(s: &str) -> Self {
        debug_assert!(
            s.len() <= UID_MAX_LEN,
            "UID exceeds {} bytes ({} bytes): {:?}",
            UID_MAX_LEN,
            s.len(),
            s,
        );
        let len = s.len().min(UID_MAX_LEN);
        let mut buf = [0u8; UID_MAX_LEN];
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { len: len as u8, buf }
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only constructed from &str, always valid UTF-8.
        match std::str::from_utf8(&self.buf[..self.len as usize]) {
            Ok(s) => s,
            Err(_) => unreachable!("UidBuf constructed from non-UTF-8"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::borrow::Borrow<str> for UidBuf {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Debug for UidBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for UidBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for UidBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for UidBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.len() > UID_MAX_LEN {
            return Err(serde::de::Error::custom(format!(
                "UID exceeds {} bytes: {:?}",
                UID_MAX_LEN, s
            )));
        }
        Ok(UidBuf::new(&s))
    }
}

/// Define a newtype UID wrapper around [`UidBuf`] with a type prefix.
///
/// Generates `new()` for random UID generation, `from_string()` for parsing,
/// `as_str()`, `Display`, `From<String>`, `From<&str>`, `PartialEq<str>`,
/// and `Borrow<str>` implementations.
///
/// The UID format is `{prefix}{nanoid}` where:
/// - `prefix`: 4 character type indicator (e.g., "itm-", "rls-")
/// - `nanoid`: 19 character random suffix
/// - Total: 23 characters (exactly fits [`UidBuf`] capacity)
#[macro_export]
macro_rules! define_uid {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $crate::uid::UidBuf);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random UID with the type prefix
            pub fn new() -> Self {
                Self($crate::uid::UidBuf::new(&format!(
                    "{}{}",
                    Self::PREFIX,
                    nanoid::nanoid!(19)
                )))
            }

            /// Create a UID from an existing string (for parsing/deserialization)
            pub fn from_string(uid: impl AsRef<str>) -> Self {
                Self($crate::uid::UidBuf::new(uid.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns true if the UID is an empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0.as_str() == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

define_uid! {
    /// UID assigned to every accepted queue item.
    pub struct ItemUid("itm-");
}

define_uid! {
    /// Snapshot token for the queue; rotates on every structural change.
    pub struct QueueUid("que-");
}

define_uid! {
    /// Snapshot token for the history; rotates on append and clear.
    pub struct HistoryUid("hst-");
}

define_uid! {
    /// Snapshot token for the run list of the currently executing plan.
    pub struct RunListUid("rls-");
}

#[cfg(test)]
#[path = "uid_tests.rs"]
mod tests;
