//! Newtype identifiers
//!
//! The wire format (JSON bodies, YAML frontmatter) keeps these as plain
//! strings; the newtypes exist so call sites inside the core can't transpose
//! a session id for a memory id at a function boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
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
    };
}

string_id!(MemoryId);
string_id!(SessionId);
string_id!(ProjectId);

/// The sentinel project id for global-scope memories and the global DB.
pub const GLOBAL_PROJECT: &str = "global";

impl ProjectId {
    pub fn global() -> Self {
        Self(GLOBAL_PROJECT.to_string())
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_PROJECT
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::global()
    }
}
