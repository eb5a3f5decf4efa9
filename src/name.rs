//! Name & label utilities (C1): normalize, split, and compare DNS names.
//!
//! A [`Name`] is an ordered sequence of labels. Comparisons are
//! case-insensitive by default; callers that need RFC-strict
//! case-sensitive comparison pass `case_sensitive = true` explicitly,
//! mirroring the per-rule `case_sensitive` flag in the design.

use std::fmt;

/// Maximum encoded length of a DNS name, RFC 1035 §3.1.
const MAX_NAME_BYTES: usize = 255;
/// Maximum length of a single label, RFC 1035 §3.1.
const MAX_LABEL_BYTES: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<String>,
}

impl Name {
    /// Parses a dotted name string into labels. Rejects empty labels
    /// (other than a single trailing root label), labels over 63 bytes,
    /// and names over 255 bytes once label-length octets are accounted
    /// for.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.strip_suffix('.').unwrap_or(input);

        if trimmed.is_empty() {
            return Ok(Self { labels: vec![] });
        }

        let mut labels = Vec::new();
        let mut encoded_len = 1; // trailing root octet
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(format!("name {input:?} contains an empty label"));
            }
            if label.len() > MAX_LABEL_BYTES {
                return Err(format!(
                    "label {label:?} in {input:?} exceeds {MAX_LABEL_BYTES} bytes"
                ));
            }
            encoded_len += label.len() + 1;
            labels.push(label.to_string());
        }

        if encoded_len > MAX_NAME_BYTES {
            return Err(format!(
                "name {input:?} exceeds {MAX_NAME_BYTES} encoded bytes"
            ));
        }

        Ok(Self { labels })
    }

    /// Builds a `Name` directly from already-split labels, skipping
    /// re-parsing. Used at the wire-codec boundary where labels arrive
    /// pre-split.
    pub fn from_labels(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Case-insensitive (unless `case_sensitive`) label-wise equality.
    pub fn equals(&self, other: &Name, case_sensitive: bool) -> bool {
        if self.labels.len() != other.labels.len() {
            return false;
        }
        self.labels
            .iter()
            .zip(other.labels.iter())
            .all(|(a, b)| label_eq(a, b, case_sensitive))
    }

    /// True iff `self`'s labels end with `parent`'s labels at a label
    /// boundary (i.e. `self == parent` or `self` is a proper subdomain of
    /// `parent`). An empty `parent` (the root) matches everything.
    pub fn is_subdomain_of(&self, parent: &Name, case_sensitive: bool) -> bool {
        if parent.labels.is_empty() {
            return true;
        }
        if self.labels.len() < parent.labels.len() {
            return false;
        }
        let offset = self.labels.len() - parent.labels.len();
        self.labels[offset..]
            .iter()
            .zip(parent.labels.iter())
            .all(|(a, b)| label_eq(a, b, case_sensitive))
    }

    /// Canonical lower-cased dotted-string form, without a trailing dot.
    pub fn to_canonical_string(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.labels.join("."))
        }
    }
}

fn label_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// The registrable "base domain" resolver, injected so the core rule
/// matcher stays decoupled from any one public-suffix-list
/// implementation (spec §4.1, §9). See [`crate::suffix::PslSuffixResolver`]
/// for the shipped default.
pub trait SuffixResolver: Send + Sync {
    /// Returns the registrable domain (public suffix + one more label),
    /// or for names under a non-public suffix (e.g. `.local`,
    /// `.internal`) the last label. Returns `None` only when `name` has
    /// no labels at all.
    fn base_domain(&self, name: &Name) -> Option<Name>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_dot_equivalently() {
        let a = Name::parse("example.com.").unwrap();
        let b = Name::parse("example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_is_idempotent() {
        let a = Name::parse("Example.COM").unwrap();
        let again = Name::parse(&a.to_string()).unwrap();
        assert_eq!(a, again);
    }

    #[test]
    fn rejects_empty_interior_label() {
        assert!(Name::parse("foo..com").is_err());
    }

    #[test]
    fn rejects_oversized_label() {
        let long = "a".repeat(64);
        assert!(Name::parse(&format!("{long}.com")).is_err());
    }

    #[test]
    fn equals_is_case_insensitive_by_default() {
        let a = Name::parse("Example.com").unwrap();
        let b = Name::parse("example.COM").unwrap();
        assert!(a.equals(&b, false));
        assert!(!a.equals(&b, true));
    }

    #[test]
    fn subdomain_matches_apex_and_deeper_names() {
        let apex = Name::parse("example.com").unwrap();
        let same = Name::parse("example.com").unwrap();
        let deeper = Name::parse("www.example.com").unwrap();
        let unrelated = Name::parse("example.net").unwrap();
        let partial_label = Name::parse("notexample.com").unwrap();

        assert!(same.is_subdomain_of(&apex, false));
        assert!(deeper.is_subdomain_of(&apex, false));
        assert!(!unrelated.is_subdomain_of(&apex, false));
        assert!(!partial_label.is_subdomain_of(&apex, false));
    }

    #[test]
    fn root_parent_matches_everything() {
        let root = Name::parse(".").unwrap();
        let anything = Name::parse("foo.bar.baz").unwrap();
        assert!(anything.is_subdomain_of(&root, false));
    }
}
