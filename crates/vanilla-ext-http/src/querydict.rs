//! Submitted form data and query strings.
//!
//! [`QueryDict`] wraps [`MultiValueDict`] and is immutable by default, so a
//! view cannot accidentally rewrite what the client sent. Tests and code that
//! assembles data programmatically use [`QueryDict::from_pairs`] or
//! [`QueryDict::copy`].

use vanilla_ext_core::utils::MultiValueDict;
use vanilla_ext_core::{VanillaError, VanillaResult};

/// An immutable-by-default dictionary for query string and form data.
///
/// # Examples
///
/// ```
/// use vanilla_ext_http::QueryDict;
///
/// let qd = QueryDict::parse("lines-0-sku=AB%2F1&lines-0-qty=2&tag=a&tag=b");
/// assert_eq!(qd.get("lines-0-sku"), Some("AB/1"));
/// assert_eq!(qd.get("tag"), Some("b"));
/// assert_eq!(qd.get_list("tag").map(<[String]>::len), Some(2));
///
/// let mut mutable = qd.copy();
/// mutable.set("tag", "c").unwrap();
/// assert_eq!(mutable.get("tag"), Some("c"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryDict {
    data: MultiValueDict<String, String>,
    mutable: bool,
}

impl QueryDict {
    /// Creates a new, empty, immutable `QueryDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, empty, mutable `QueryDict`.
    pub fn new_mutable() -> Self {
        Self {
            data: MultiValueDict::new(),
            mutable: true,
        }
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    pub fn parse(query_string: &str) -> Self {
        let data = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(key), percent_decode(value))
            })
            .collect();
        Self {
            data,
            mutable: false,
        }
    }

    /// Builds an immutable `QueryDict` from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            mutable: false,
        }
    }

    /// Returns the last value for the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Returns all values for the given key.
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.data.get_list(key)
    }

    /// Sets a single value for the given key, replacing any existing values.
    ///
    /// # Errors
    ///
    /// Returns [`VanillaError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn set(&mut self, key: &str, value: &str) -> VanillaResult<()> {
        self.ensure_mutable()?;
        self.data.set(key.to_string(), value.to_string());
        Ok(())
    }

    /// Appends a value to the list for the given key.
    ///
    /// # Errors
    ///
    /// Returns [`VanillaError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn append(&mut self, key: &str, value: &str) -> VanillaResult<()> {
        self.ensure_mutable()?;
        self.data.append(key.to_string(), value.to_string());
        Ok(())
    }

    /// Returns a mutable copy of this `QueryDict`.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            data: self.data.clone(),
            mutable: true,
        }
    }

    /// Encodes this `QueryDict` as a sorted query string.
    pub fn urlencode(&self) -> String {
        let mut parts: Vec<String> = self
            .data
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| format!("{}={}", percent_encode(key), percent_encode(value)))
            })
            .collect();
        parts.sort();
        parts.join("&")
    }

    /// Returns `true` if this `QueryDict` is mutable.
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the `QueryDict` contains no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the specified key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    fn ensure_mutable(&self) -> VanillaResult<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(VanillaError::SuspiciousOperation(
                "This QueryDict instance is immutable".to_string(),
            ))
        }
    }
}

fn percent_decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_string() {
        assert!(QueryDict::parse("").is_empty());
        assert!(QueryDict::parse("&&").is_empty());
    }

    #[test]
    fn test_parse_plus_and_percent() {
        let qd = QueryDict::parse("name=Ada+Lovelace&note=50%25");
        assert_eq!(qd.get("name"), Some("Ada Lovelace"));
        assert_eq!(qd.get("note"), Some("50%"));
    }

    #[test]
    fn test_parse_key_without_value() {
        let qd = QueryDict::parse("lines-0-DELETE&x=1");
        assert_eq!(qd.get("lines-0-DELETE"), Some(""));
        assert!(qd.contains_key("x"));
    }

    #[test]
    fn test_immutable_rejects_writes() {
        let mut qd = QueryDict::parse("a=1");
        assert!(!qd.is_mutable());
        assert!(matches!(
            qd.set("a", "2"),
            Err(VanillaError::SuspiciousOperation(_))
        ));
        assert!(qd.append("a", "2").is_err());
    }

    #[test]
    fn test_mutable_append() {
        let mut qd = QueryDict::new_mutable();
        qd.append("k", "1").unwrap();
        qd.append("k", "2").unwrap();
        assert_eq!(qd.get_list("k").map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_from_pairs() {
        let qd = QueryDict::from_pairs([("form-TOTAL_FORMS", "2"), ("form-0-name", "x")]);
        assert_eq!(qd.get("form-TOTAL_FORMS"), Some("2"));
        assert_eq!(qd.len(), 2);
    }

    #[test]
    fn test_urlencode_sorted() {
        let qd = QueryDict::from_pairs([("b", "2 3"), ("a", "1")]);
        assert_eq!(qd.urlencode(), "a=1&b=2%203");
    }
}
