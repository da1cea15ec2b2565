//! Actor identity.
//!
//! `spec.md` §9 deliberately keeps actor targeting name-based rather than
//! reference-based ("a registry maps names to actor handles") to avoid
//! ownership cycles between actors. [`ActorName`] is the key into that
//! registry; it is cheap to clone (an `Arc<str>` under the hood) since it
//! gets copied into every envelope, trace event, and stats log entry.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorName(Arc<str>);

impl ActorName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActorName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&ActorName> for ActorName {
    fn from(name: &ActorName) -> Self {
        name.clone()
    }
}
