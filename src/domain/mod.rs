pub mod actor;
pub mod decision;
pub mod group;
pub mod policy;
pub mod role;
pub mod target;
pub mod value;

pub use actor::Actor;
pub use decision::Decision;
pub use group::{Group, GroupMember};
pub use policy::{ActorCheck, Policy, TargetCheck};
pub use role::Role;
pub use target::Target;
pub use value::{AttributeMap, KvCheck, NumberCheck, StringCheck};

use std::collections::{HashMap, HashSet};

/// Wire shape for attribute payloads: key to list of values.
pub type AttributeArg = HashMap<String, Vec<String>>;

/// Case-folded form used for identity, indexing and comparison.
/// The submitted form is kept on the entity for display.
pub fn canonical(s: &str) -> String {
    s.to_lowercase()
}

/// Collapse a wire attribute payload into a deduplicated attribute map.
pub fn to_attribute_map(arg: AttributeArg) -> AttributeMap {
    arg.into_iter()
        .map(|(key, values)| (key, HashSet::from_iter(values)))
        .collect()
}

/// Merge attribute values into a map, creating keys as needed.
pub(crate) fn extend_attributes(map: &mut AttributeMap, add: &AttributeArg) {
    for (key, values) in add {
        map.entry(key.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
}

/// Remove attribute values from a map. Unknown values are ignored;
/// a key left without values is dropped entirely.
pub(crate) fn retract_attributes(map: &mut AttributeMap, remove: &AttributeArg) {
    for (key, values) in remove {
        if let Some(current) = map.get_mut(key) {
            for value in values {
                current.remove(value);
            }
            if current.is_empty() {
                map.remove(key);
            }
        }
    }
}
