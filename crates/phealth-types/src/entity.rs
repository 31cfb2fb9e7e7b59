//! Entity identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path-segment identifier of a trackable entity.
///
/// Equality, ordering and hashing are structural over the segment sequence,
/// so two keys built from the same segments are interchangeable as map keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub path: Vec<String>,
}

impl EntityKey {
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a `/`-separated string into segments. Empty segments are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::new(text.split('/').filter(|segment| !segment.is_empty()))
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.path
    }

    /// Deterministic serialization: the JSON array of segments.
    ///
    /// Unlike [`fmt::Display`], this is injective even when segments contain
    /// `/`.
    #[must_use]
    pub fn to_cache_key(&self) -> String {
        let mut out = String::from("[");
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::Value::String(segment.clone()).to_string());
        }
        out.push(']');
        out
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("/"))
    }
}

impl<S: Into<String>> From<Vec<S>> for EntityKey {
    fn from(segments: Vec<S>) -> Self {
        Self::new(segments)
    }
}
