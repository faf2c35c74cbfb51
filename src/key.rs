//! Structural identifiers for cached resources.

use std::fmt;

/// An ordered tuple of segments identifying a cached resource.
///
/// Equality is structural: `["users"]` and `["users", "u1"]` are distinct
/// keys, and two keys built from the same segments compare equal.
///
/// # Example
///
/// ```
/// use roster::key::QueryKey;
///
/// let users = QueryKey::from(["users"]);
/// let one = users.child("u1");
/// assert_ne!(users, one);
/// assert_eq!(one, QueryKey::from(["users", "u1"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Creates a key from an ordered list of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a new key with one more segment appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The key's segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for QueryKey {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl From<&str> for QueryKey {
    fn from(segment: &str) -> Self {
        Self::new([segment])
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}
