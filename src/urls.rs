//! Deduplicated, ordered URL sets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered sequence of absolute URLs with no duplicates.
///
/// Construction canonicalizes every entry through [`url::Url`] and drops
/// duplicates and non-http(s) entries, preserving first-seen order. A set may
/// be empty, in which case no work is dispatched for it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct UrlSet(Vec<String>);

impl UrlSet {
    /// Build a set from raw URL strings.
    ///
    /// Entries that do not parse as absolute http(s) URLs are dropped with a
    /// debug log rather than failing the whole set; one bad permalink must
    /// not stop cache maintenance for the rest.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for entry in raw {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match url::Url::parse(entry) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
                    let canonical = parsed.to_string();
                    if seen.insert(canonical.clone()) {
                        urls.push(canonical);
                    }
                }
                Ok(parsed) => {
                    tracing::debug!(url = %entry, scheme = %parsed.scheme(), "Dropping non-http URL");
                }
                Err(error) => {
                    tracing::debug!(url = %entry, error = %error, "Dropping unparseable URL");
                }
            }
        }
        UrlSet(urls)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Partition into contiguous slices of at most `size` entries, preserving
    /// relative order. A size of zero is treated as one.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = &[String]> {
        self.0.chunks(size.max(1))
    }
}

impl From<Vec<String>> for UrlSet {
    fn from(raw: Vec<String>) -> Self {
        UrlSet::new(raw)
    }
}

impl<'a> IntoIterator for &'a UrlSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_preserving_order() {
        let set = UrlSet::new([
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/a",
        ]);
        assert_eq!(
            set.as_slice(),
            &["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn drops_invalid_and_relative_entries() {
        let set = UrlSet::new(["https://example.com/a", "/relative/path", "not a url", ""]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0], "https://example.com/a");
    }

    #[test]
    fn drops_non_http_schemes() {
        let set = UrlSet::new(["ftp://example.com/a", "https://example.com/a"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let set = UrlSet::new(Vec::<String>::new());
        assert!(set.is_empty());
        assert_eq!(set.chunks(30).count(), 0);
    }

    #[test]
    fn chunks_partition_without_loss() {
        let urls: Vec<String> = (0..70)
            .map(|i| format!("https://example.com/p/{i}"))
            .collect();
        let set = UrlSet::new(&urls);
        let chunks: Vec<_> = set.chunks(30).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 30);
        assert_eq!(chunks[1].len(), 30);
        assert_eq!(chunks[2].len(), 10);
        let rejoined: Vec<_> = chunks.concat();
        assert_eq!(rejoined, set.as_slice());
    }

    #[test]
    fn chunk_size_zero_is_treated_as_one() {
        let set = UrlSet::new(["https://example.com/a", "https://example.com/b"]);
        assert_eq!(set.chunks(0).count(), 2);
    }

    #[test]
    fn deserialization_canonicalizes() {
        let set: UrlSet =
            serde_json::from_str(r#"["https://x.test/a","https://x.test/a","junk"]"#).unwrap();
        assert_eq!(set.as_slice(), &["https://x.test/a"]);
    }
}
