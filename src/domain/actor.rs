use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::value::AttributeMap;
use super::{canonical, extend_attributes, retract_attributes, AttributeArg};

/// The subject of an authorization check.
///
/// Actors may be registered ahead of time to carry stored attributes, but a
/// check can also reference an actor the registry has never seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub typestr: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Actor {
    pub fn new(name: &str, typestr: &str, attributes: AttributeMap) -> Self {
        Actor {
            name: name.to_string(),
            typestr: typestr.to_string(),
            attributes,
        }
    }

    /// Canonical identity tuple used for indexing and equality.
    pub fn key(&self) -> (String, String) {
        (canonical(&self.typestr), canonical(&self.name))
    }

    /// Deterministic rollout bucket in `[0, 99]`.
    ///
    /// Derived from the canonical identity so the same actor lands in the
    /// same bucket across calls, processes and hosts.
    pub fn bucket(&self) -> u8 {
        let identity = format!("{}/{}", canonical(&self.typestr), canonical(&self.name));
        let digest = Sha256::digest(identity.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(word) % 100) as u8
    }

    pub fn add_attributes(&mut self, add: &AttributeArg) {
        extend_attributes(&mut self.attributes, add);
    }

    pub fn remove_attributes(&mut self, remove: &AttributeArg) {
        retract_attributes(&mut self.attributes, remove);
    }
}
