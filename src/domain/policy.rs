use serde::{Deserialize, Serialize};

use super::actor::Actor;
use super::decision::Decision;
use super::value::{AttributeMap, KvCheck, NumberCheck, StringCheck};

/// Constraints a rule places on the requesting actor.
///
/// Absent sub-checks are vacuously true; present sub-checks are all ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCheck {
    #[serde(default)]
    pub name: Option<StringCheck>,
    #[serde(default)]
    pub typestr: Option<StringCheck>,
    /// Checked against the enriched attribute map, which includes the
    /// derived `member-of` and `has-role` attributes.
    #[serde(default)]
    pub attributes: Vec<KvCheck>,
    #[serde(default)]
    pub bucket: Option<NumberCheck>,
}

impl ActorCheck {
    pub fn matches(&self, actor: &Actor, bucket: u8) -> bool {
        if let Some(ref name_check) = self.name {
            if !name_check.check(&actor.name) {
                return false;
            }
        }

        if let Some(ref type_check) = self.typestr {
            if !type_check.check(&actor.typestr) {
                return false;
            }
        }

        if self.attributes.iter().any(|a| !a.check(&actor.attributes)) {
            return false;
        }

        if let Some(ref bucket_check) = self.bucket {
            if !bucket_check.check(bucket.into()) {
                return false;
            }
        }

        true
    }
}

/// Constraints a rule places on the requested target and action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCheck {
    #[serde(default)]
    pub name: Option<StringCheck>,
    #[serde(default)]
    pub typestr: Option<StringCheck>,
    /// Checked against the target's stored attributes.
    #[serde(default)]
    pub attributes: Vec<KvCheck>,
    /// Attribute keys that must share at least one value between the
    /// target and the actor.
    #[serde(default)]
    pub match_in_actor: Vec<String>,
    /// Attribute keys that must share at least one value between the
    /// target and the request environment.
    #[serde(default)]
    pub match_in_env: Vec<String>,
    #[serde(default)]
    pub action: Option<StringCheck>,
}

impl TargetCheck {
    /// True when the sets stored under `key` on both sides intersect.
    /// A missing key on either side is an empty set, so the match fails.
    fn attr_overlaps(key: &str, ours: &AttributeMap, theirs: &AttributeMap) -> bool {
        match (ours.get(key), theirs.get(key)) {
            (Some(our_vals), Some(their_vals)) => {
                our_vals.iter().any(|v| their_vals.contains(v))
            }
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn matches(
        &self,
        target_name: &str,
        target_type: &str,
        target_attributes: &AttributeMap,
        target_action: &str,
        actor_attributes: &AttributeMap,
        env_attributes: &AttributeMap,
    ) -> bool {
        if let Some(ref name_check) = self.name {
            if !name_check.check(target_name) {
                return false;
            }
        }

        if let Some(ref type_check) = self.typestr {
            if !type_check.check(target_type) {
                return false;
            }
        }

        if self.attributes.iter().any(|a| !a.check(target_attributes)) {
            return false;
        }

        for key in &self.match_in_actor {
            if !Self::attr_overlaps(key, target_attributes, actor_attributes) {
                return false;
            }
        }

        for key in &self.match_in_env {
            if !Self::attr_overlaps(key, target_attributes, env_attributes) {
                return false;
            }
        }

        if let Some(ref action_check) = self.action {
            if !action_check.check(target_action) {
                return false;
            }
        }

        true
    }
}

/// A named rule: a predicate over (actor, environment, target) and the
/// decision to take when every present sub-check matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    /// Actor constraint; `None` matches every actor.
    #[serde(default)]
    pub actor_check: Option<ActorCheck>,
    /// Environment constraints, all of which must hold.
    #[serde(default)]
    pub env_attributes: Vec<KvCheck>,
    /// Target constraint; `None` matches every target.
    #[serde(default)]
    pub target_check: Option<TargetCheck>,
    pub decision: Decision,
}

impl Policy {
    /// Canonical name used for indexing and equality.
    pub fn key(&self) -> String {
        super::canonical(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn str(val: &str) -> String {
        val.to_string()
    }

    fn attrs(pairs: &[(&str, &[&str])]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, vs)| (str(k), vs.iter().map(|v| str(v)).collect::<HashSet<_>>()))
            .collect()
    }

    fn open_check() -> ActorCheck {
        ActorCheck {
            name: None,
            typestr: None,
            attributes: vec![],
            bucket: None,
        }
    }

    #[test]
    fn test_actor_check() {
        let actor = Actor::new(
            "kaitlyn",
            "user",
            attrs(&[("role", &["admin", "user"]), ("region", &["us"])]),
        );
        let bucket = actor.bucket();

        // an unconstrained check matches anything
        assert!(open_check().matches(&actor, bucket));

        // name
        assert!(ActorCheck {
            name: Some(StringCheck::OneOf(vec![str("betty"), str("kaitlyn")])),
            ..open_check()
        }
        .matches(&actor, bucket));
        assert!(!ActorCheck {
            name: Some(StringCheck::OneOf(vec![str("jonny")])),
            ..open_check()
        }
        .matches(&actor, bucket));

        // type
        assert!(ActorCheck {
            typestr: Some(StringCheck::OneOf(vec![str("user")])),
            ..open_check()
        }
        .matches(&actor, bucket));
        assert!(!ActorCheck {
            typestr: Some(StringCheck::NotOneOf(vec![str("user")])),
            ..open_check()
        }
        .matches(&actor, bucket));

        // attributes
        assert!(ActorCheck {
            attributes: vec![KvCheck::Has {
                key: str("region"),
                values: vec![str("us")],
            }],
            ..open_check()
        }
        .matches(&actor, bucket));
        assert!(!ActorCheck {
            attributes: vec![KvCheck::Has {
                key: str("role"),
                values: vec![str("manager")],
            }],
            ..open_check()
        }
        .matches(&actor, bucket));

        // bucket
        assert!(ActorCheck {
            bucket: Some(NumberCheck::LessThan(i32::from(bucket) + 1)),
            ..open_check()
        }
        .matches(&actor, bucket));
        assert!(!ActorCheck {
            bucket: Some(NumberCheck::MoreThan(bucket.into())),
            ..open_check()
        }
        .matches(&actor, bucket));
    }

    fn open_target_check() -> TargetCheck {
        TargetCheck {
            name: None,
            typestr: None,
            attributes: vec![],
            match_in_actor: vec![],
            match_in_env: vec![],
            action: None,
        }
    }

    #[test]
    fn test_target_check() {
        let target_attrs = attrs(&[("role", &["main", "backup"]), ("env", &["test"])]);
        let actor_attrs = attrs(&[("office", &["sfo", "remote"]), ("env", &["test", "prod"])]);
        let env_attrs = attrs(&[("env", &["test"])]);

        let matches = |check: &TargetCheck| {
            check.matches("bree", "db", &target_attrs, "read", &actor_attrs, &env_attrs)
        };

        // an unconstrained check matches anything
        assert!(matches(&open_target_check()));

        // name and type
        assert!(matches(&TargetCheck {
            name: Some(StringCheck::OneOf(vec![str("bree")])),
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            name: Some(StringCheck::NotOneOf(vec![str("bree")])),
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            typestr: Some(StringCheck::OneOf(vec![str("web")])),
            ..open_target_check()
        }));

        // stored attributes
        assert!(matches(&TargetCheck {
            attributes: vec![KvCheck::Has {
                key: str("env"),
                values: vec![str("test")],
            }],
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            attributes: vec![KvCheck::Has {
                key: str("load"),
                values: vec![str("nominal")],
            }],
            ..open_target_check()
        }));

        // action
        assert!(matches(&TargetCheck {
            action: Some(StringCheck::OneOf(vec![str("read")])),
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            action: Some(StringCheck::OneOf(vec![str("write")])),
            ..open_target_check()
        }));

        // the target and actor share env=test but have no common role value
        assert!(matches(&TargetCheck {
            match_in_actor: vec![str("env")],
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            match_in_actor: vec![str("role")],
            ..open_target_check()
        }));

        // cross-match against the request environment
        assert!(matches(&TargetCheck {
            match_in_env: vec![str("env")],
            ..open_target_check()
        }));
        assert!(!matches(&TargetCheck {
            match_in_env: vec![str("office")],
            ..open_target_check()
        }));
    }

    #[test]
    fn test_cross_match_missing_key_fails() {
        let empty = AttributeMap::new();
        let populated = attrs(&[("env", &["prod"])]);

        let check = TargetCheck {
            match_in_actor: vec![str("env")],
            ..open_target_check()
        };

        // key missing on the target side
        assert!(!check.matches("t", "db", &empty, "read", &populated, &empty));
        // key missing on the actor side
        assert!(!check.matches("t", "db", &populated, "read", &empty, &empty));
    }

    #[test]
    fn test_policy_round_trip() {
        let policy = Policy {
            name: str("p1"),
            desc: Some(str("allow admins")),
            actor_check: Some(ActorCheck {
                attributes: vec![KvCheck::Has {
                    key: str("has-role"),
                    values: vec![str("admin")],
                }],
                ..open_check()
            }),
            env_attributes: vec![],
            target_check: None,
            decision: Decision::Allow,
        };

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }
}
