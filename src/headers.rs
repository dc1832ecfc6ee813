//! Ordered, case-insensitive header map.

use std::fmt;

/// Header name/value pairs in insertion order.
///
/// Lookups ignore ASCII case. Inserting a name that is already present
/// (in any casing) replaces the value in place, so the map never holds two
/// entries for the same header: last write wins, first position is kept.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`, overwriting any existing entry for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Sets `name` only when no entry for it exists yet.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let headers = Headers::from([("Host", "localhost"), ("X-Test", "demo")]);

        assert_eq!(headers.get("x-test"), Some("demo"));
        assert_eq!(headers.get("X-TEST"), Some("demo"));
        assert_eq!(headers.get("X-Test"), Some("demo"));
        assert_eq!(headers.get("HOST"), Some("localhost"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn repeated_names_overwrite_in_place() {
        let mut headers = Headers::new();
        headers.insert("Accept", "text/html");
        headers.insert("X-Trace", "1");
        headers.insert("accept", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Accept"), Some("application/json"));
        let names: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["Accept", "X-Trace"]);
    }

    #[test]
    fn insert_if_absent_keeps_existing_value() {
        let mut headers = Headers::from([("content-type", "application/json")]);
        headers.insert_if_absent("Content-Type", "text/plain");
        headers.insert_if_absent("Content-Length", "3");

        assert_eq!(headers.get("Content-Type"), Some("application/json"));
        assert_eq!(headers.get("content-length"), Some("3"));
    }
}
