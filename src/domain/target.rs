use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::value::AttributeMap;
use super::{canonical, extend_attributes, retract_attributes, AttributeArg};

/// An object that actions are performed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub typestr: String,
    /// Known actions, held in canonical form.
    #[serde(default)]
    pub actions: HashSet<String>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Target {
    pub fn new(name: &str, typestr: &str, actions: Vec<String>, attributes: AttributeMap) -> Self {
        Target {
            name: name.to_string(),
            typestr: typestr.to_string(),
            actions: actions.iter().map(|a| canonical(a)).collect(),
            attributes,
        }
    }

    /// Canonical identity tuple used for indexing and equality.
    pub fn key(&self) -> (String, String) {
        (canonical(&self.typestr), canonical(&self.name))
    }

    pub fn add_actions(&mut self, actions: &[String]) {
        self.actions.extend(actions.iter().map(|a| canonical(a)));
    }

    pub fn remove_actions(&mut self, actions: &[String]) {
        for action in actions {
            self.actions.remove(&canonical(action));
        }
    }

    pub fn add_attributes(&mut self, add: &AttributeArg) {
        extend_attributes(&mut self.attributes, add);
    }

    pub fn remove_attributes(&mut self, remove: &AttributeArg) {
        retract_attributes(&mut self.attributes, remove);
    }
}
