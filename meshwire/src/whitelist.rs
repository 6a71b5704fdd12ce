use std::collections::BTreeSet;
use std::sync::Arc;

/// Path of the route listing, exempt from authentication and compression.
pub const DOCS_PATH: &str = "/docs";

/// Paths exempt from authentication and compression.
///
/// Always contains [`DOCS_PATH`]. Immutable once built; clones share storage.
#[derive(Clone, Debug)]
pub struct Whitelist(Arc<BTreeSet<String>>);

impl Whitelist {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        set.insert(DOCS_PATH.to_string());
        Whitelist(Arc::new(set))
    }

    /// Exact path match.
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist::new(std::iter::empty::<String>())
    }
}
