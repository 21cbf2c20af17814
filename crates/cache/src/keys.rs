//! Cache key construction from ordered parts
//!
//! A key is built by escaping every part and joining the parts with a
//! delimiter. Inside a part, the escape character is written twice and the
//! delimiter is preceded by the escape character, so a part can never
//! introduce a boundary of its own: two different part lists always produce
//! two different keys.

use entcache_core::{CacheError, Result, DEFAULT_KEY_DELIMITER, KEY_ESCAPE};

/// Builds and parses keys from ordered string parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartsKeyBuilder {
    delimiter: char,
}

impl Default for PartsKeyBuilder {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_KEY_DELIMITER,
        }
    }
}

impl PartsKeyBuilder {
    /// Create a builder with a custom delimiter
    ///
    /// The delimiter may not be the escape character (`\`).
    pub fn new(delimiter: char) -> Result<Self> {
        if delimiter == KEY_ESCAPE {
            return Err(CacheError::configuration(format!(
                "key delimiter cannot be the escape character '{KEY_ESCAPE}'"
            )));
        }
        Ok(Self { delimiter })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Escape each part and join with the delimiter
    pub fn build<S: AsRef<str>>(&self, parts: &[S]) -> String {
        let capacity = parts.iter().map(|p| p.as_ref().len() + 1).sum();
        let mut key = String::with_capacity(capacity);
        for (index, part) in parts.iter().enumerate() {
            if index > 0 {
                key.push(self.delimiter);
            }
            self.escape_into(part.as_ref(), &mut key);
        }
        key
    }

    /// Split a key back into its unescaped parts
    ///
    /// A trailing lone escape character is kept literally. The empty key
    /// parses to a single empty part.
    pub fn parse(&self, key: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = key.chars();

        while let Some(c) = chars.next() {
            if c == KEY_ESCAPE {
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => current.push(KEY_ESCAPE),
                }
            } else if c == self.delimiter {
                parts.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        parts.push(current);
        parts
    }

    /// Join an already-built key onto namespace parts
    ///
    /// Equivalent to building `namespace ++ parse(key)` without re-escaping.
    pub fn prefixed<S: AsRef<str>>(&self, namespace: &[S], key: &str) -> String {
        if namespace.is_empty() {
            return key.to_string();
        }
        let mut prefixed = self.build(namespace);
        prefixed.push(self.delimiter);
        prefixed.push_str(key);
        prefixed
    }

    fn escape_into(&self, part: &str, out: &mut String) {
        for c in part.chars() {
            if c == KEY_ESCAPE || c == self.delimiter {
                out.push(KEY_ESCAPE);
            }
            out.push(c);
        }
    }
}
