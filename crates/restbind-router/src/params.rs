//! Name/value parameter storage.
//!
//! Path, matrix, cookie, query and form values all land in a [`Params`].
//! Names may repeat: lookups return the first value, [`Params::get_all`]
//! returns every value in arrival order.

use smallvec::SmallVec;

/// Most requests carry a few values per source; these stay inline.
type Pairs = SmallVec<[(String, String); 4]>;

/// Ordered (name, value) pairs taken from one part of a request.
///
/// ```rust
/// use restbind_router::Params;
///
/// let mut params = Params::new();
/// params.push("org", "acme");
/// params.push("tag", "red");
/// params.push("tag", "blue");
///
/// assert_eq!(params.get("org"), Some("acme"));
/// assert_eq!(params.get("tag"), Some("red"));
/// assert_eq!(params.get_all("tag").count(), 2);
/// assert!(!params.contains("user"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    pairs: Pairs,
}

impl Params {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value; earlier values under the same name keep precedence.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Every value stored under `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter(move |(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Whether any value is stored under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of stored pairs, repeats included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, String)> for Params {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}
