//! Domain set value type.
//!
//! The registry returns domains as a list, and the persisted state stores
//! them as a list, but every comparison between the two is a set comparison.
//! `DomainSet` makes that the only comparison available.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An ordered, duplicate-free set of domain names.
///
/// Names are compared as exact, case-sensitive strings. No normalization is
/// applied: `Example.com` and `example.com` are different members.
///
/// Serializes as a sorted JSON array; deserializing an array with duplicates
/// collapses them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainSet(BTreeSet<String>);

impl DomainSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate members in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Members as an owned, sorted vector
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    /// Members of `self` missing from `other`
    pub fn difference<'a>(&'a self, other: &'a DomainSet) -> impl Iterator<Item = &'a str> {
        self.0.difference(&other.0).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for DomainSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for DomainSet {
    fn from(domains: Vec<String>) -> Self {
        domains.into_iter().collect()
    }
}

impl fmt::Display for DomainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for domain in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(domain)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_order_does_not_matter() {
        let a: DomainSet = ["a.example.com", "b.example.com", "c.example.com"]
            .into_iter()
            .collect();
        let b: DomainSet = ["c.example.com", "a.example.com", "b.example.com"]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_collapse() {
        let set: DomainSet = ["example.com", "example.com", "test.example.com"]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        let expected: DomainSet = ["test.example.com", "example.com"].into_iter().collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let lower: DomainSet = ["example.com"].into_iter().collect();
        let upper: DomainSet = ["Example.com"].into_iter().collect();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_lists_with_one_different_member() {
        let a: DomainSet = [
            "example.com",
            "test.example.com",
            "demo.example.com",
            "play.example.com",
        ]
        .into_iter()
        .collect();
        let b: DomainSet = [
            "example.com",
            "best.example.com",
            "demo.example.com",
            "play.example.com",
        ]
        .into_iter()
        .collect();
        assert_ne!(a, b);
        assert_eq!(a.difference(&b).collect::<Vec<_>>(), vec!["test.example.com"]);
        assert_eq!(b.difference(&a).collect::<Vec<_>>(), vec!["best.example.com"]);
    }

    #[test]
    fn test_serde_is_a_sorted_array() {
        let set: DomainSet = ["b.example.com", "a.example.com"].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["a.example.com","b.example.com"]"#);

        let parsed: DomainSet =
            serde_json::from_str(r#"["b.example.com","a.example.com","b.example.com"]"#).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_display() {
        let set: DomainSet = ["b.example.com", "a.example.com"].into_iter().collect();
        assert_eq!(set.to_string(), "a.example.com,b.example.com");
        assert_eq!(DomainSet::new().to_string(), "");
    }

    proptest! {
        #[test]
        fn prop_any_permutation_is_equal(mut domains in prop::collection::vec("[a-z]{1,8}\\.com", 0..12)) {
            let original: DomainSet = domains.iter().cloned().collect();
            domains.reverse();
            let copy = domains.clone();
            domains.extend(copy);
            let shuffled: DomainSet = domains.into_iter().collect();
            prop_assert_eq!(original, shuffled);
        }
    }
}
