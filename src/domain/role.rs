use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::canonical;

/// A role, granted to actors indirectly through groups.
///
/// `granted_to` mirrors `Group::roles`; writes keep both sides in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    /// Canonical names of groups this role is granted to.
    #[serde(default)]
    pub granted_to: HashSet<String>,
}

impl Role {
    pub fn new(name: &str, desc: Option<String>, granted_to: HashSet<String>) -> Self {
        Role {
            name: name.to_string(),
            desc,
            granted_to,
        }
    }

    /// Canonical name used for indexing and equality.
    pub fn key(&self) -> String {
        canonical(&self.name)
    }
}
