//! Opaque identifiers
//!
//! Cross-entity references are plain string ids so drafts stay serializable
//! and match the persisted rows one to one.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random id (UUID v4)
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Owner of conversations, drafts and reference data
    UserId
);
string_id!(ConversationId);
string_id!(DraftId);
string_id!(PoolId);
string_id!(CategoryId);
string_id!(TransactionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(DraftId::generate(), DraftId::generate());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = PoolId::new("pool-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pool-1\"");
        let back: PoolId = serde_json::from_str("\"pool-1\"").unwrap();
        assert_eq!(back, id);
    }
}
