use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Multi-valued attributes: a key maps to a set of string values.
pub type AttributeMap = HashMap<String, HashSet<String>>;

/// A string comparison against a list of candidate values.
///
/// Comparison is case-insensitive: names, types and actions are matched in
/// their canonical form regardless of how either side was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringCheck {
    /// Passes when the value equals one of these.
    OneOf(Vec<String>),
    /// Passes when the value equals none of these.
    NotOneOf(Vec<String>),
}

impl StringCheck {
    pub fn check(&self, val: &str) -> bool {
        match self {
            StringCheck::OneOf(candidates) => {
                candidates.iter().any(|c| c.eq_ignore_ascii_case(val))
            }
            StringCheck::NotOneOf(candidates) => {
                !candidates.iter().any(|c| c.eq_ignore_ascii_case(val))
            }
        }
    }
}

/// A set comparison against one key of a multi-valued attribute map.
///
/// `Has` passes when the stored set contains any of the listed values;
/// `HasNot` when it contains none. A missing key behaves as an empty set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvCheck {
    Has { key: String, values: Vec<String> },
    HasNot { key: String, values: Vec<String> },
}

impl KvCheck {
    pub fn check(&self, attrs: &AttributeMap) -> bool {
        match self {
            KvCheck::Has { key, values } => attrs
                .get(key)
                .map(|stored| values.iter().any(|v| stored.contains(v)))
                .unwrap_or(false),
            KvCheck::HasNot { key, values } => attrs
                .get(key)
                .map(|stored| !values.iter().any(|v| stored.contains(v)))
                .unwrap_or(true),
        }
    }
}

/// A numeric comparison against a context-derived integer (the bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberCheck {
    Equals(i32),
    LessThan(i32),
    MoreThan(i32),
}

impl NumberCheck {
    pub fn check(&self, num: i32) -> bool {
        match self {
            NumberCheck::Equals(val) => num == *val,
            NumberCheck::LessThan(val) => num < *val,
            NumberCheck::MoreThan(val) => num > *val,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str(val: &str) -> String {
        val.to_string()
    }

    fn attrs(pairs: &[(&str, &[&str])]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, vs)| (str(k), vs.iter().map(|v| str(v)).collect()))
            .collect()
    }

    #[test]
    fn test_string_check() {
        assert!(StringCheck::OneOf(vec![str("alpha"), str("beta")]).check("alpha"));
        assert!(StringCheck::OneOf(vec![str("alpha"), str("beta")]).check("beta"));
        assert!(!StringCheck::OneOf(vec![str("alpha"), str("beta")]).check("gamma"));

        assert!(!StringCheck::NotOneOf(vec![str("alpha"), str("beta")]).check("alpha"));
        assert!(StringCheck::NotOneOf(vec![str("alpha"), str("beta")]).check("gamma"));
    }

    #[test]
    fn test_string_check_is_case_insensitive() {
        assert!(StringCheck::OneOf(vec![str("Alice")]).check("alice"));
        assert!(StringCheck::OneOf(vec![str("alice")]).check("ALICE"));
        assert!(!StringCheck::NotOneOf(vec![str("Alice")]).check("aLiCe"));
    }

    #[test]
    fn test_string_check_empty_candidates() {
        // nothing can equal a member of the empty list
        assert!(!StringCheck::OneOf(vec![]).check("anything"));
        assert!(StringCheck::NotOneOf(vec![]).check("anything"));
    }

    #[test]
    fn test_kv_check() {
        let map = attrs(&[("role", &["admin", "user"]), ("region", &["us", "emea"])]);

        assert!(KvCheck::Has {
            key: str("role"),
            values: vec![str("banned"), str("user")],
        }
        .check(&map));
        assert!(!KvCheck::Has {
            key: str("role"),
            values: vec![str("manager")],
        }
        .check(&map));
        assert!(KvCheck::HasNot {
            key: str("role"),
            values: vec![str("manager")],
        }
        .check(&map));
        assert!(!KvCheck::HasNot {
            key: str("region"),
            values: vec![str("emea")],
        }
        .check(&map));
    }

    #[test]
    fn test_kv_check_missing_key() {
        let map = attrs(&[("role", &["admin"])]);

        assert!(!KvCheck::Has {
            key: str("office"),
            values: vec![str("london")],
        }
        .check(&map));
        assert!(KvCheck::HasNot {
            key: str("office"),
            values: vec![str("london")],
        }
        .check(&map));
    }

    #[test]
    fn test_number_check() {
        assert!(NumberCheck::Equals(50).check(50));
        assert!(!NumberCheck::Equals(50).check(100));
        assert!(NumberCheck::LessThan(50).check(40));
        assert!(!NumberCheck::LessThan(50).check(50));
        assert!(NumberCheck::MoreThan(50).check(100));
        assert!(!NumberCheck::MoreThan(50).check(40));
    }

    #[test]
    fn test_check_serialization() {
        let check = StringCheck::OneOf(vec![str("db")]);
        let json = serde_json::to_string(&check).unwrap();
        assert_eq!(json, r#"{"one_of":["db"]}"#);

        let kv: KvCheck = serde_json::from_str(r#"{"has":{"key":"env","values":["prod"]}}"#).unwrap();
        assert_eq!(
            kv,
            KvCheck::Has {
                key: str("env"),
                values: vec![str("prod")],
            }
        );

        let num: NumberCheck = serde_json::from_str(r#"{"less_than":50}"#).unwrap();
        assert_eq!(num, NumberCheck::LessThan(50));
    }
}
