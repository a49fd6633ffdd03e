use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::canonical;

/// Membership entry of a group, stored in canonical form.
///
/// Members are loose references: the actor does not have to be registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,
    pub typestr: String,
}

impl GroupMember {
    pub fn new(name: &str, typestr: &str) -> Self {
        GroupMember {
            name: canonical(name),
            typestr: canonical(typestr),
        }
    }
}

/// A named collection of actors that roles are granted to.
///
/// `roles` mirrors `Role::granted_to`; writes keep both sides in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub members: HashSet<GroupMember>,
    /// Canonical names of roles granted to this group.
    #[serde(default)]
    pub roles: HashSet<String>,
}

impl Group {
    pub fn new(
        name: &str,
        desc: Option<String>,
        members: HashSet<GroupMember>,
        roles: HashSet<String>,
    ) -> Self {
        Group {
            name: name.to_string(),
            desc,
            members,
            roles,
        }
    }

    /// Canonical name used for indexing and equality.
    pub fn key(&self) -> String {
        canonical(&self.name)
    }
}
