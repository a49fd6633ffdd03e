use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::domain::{canonical, Actor, Group, GroupMember, Policy, Role, Target};

/// Entity counts, reported by `/ready` and `/metrics`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryStats {
    pub targets: usize,
    pub actors: usize,
    pub roles: usize,
    pub groups: usize,
    pub policies: usize,
}

/// In-memory indexed store of all persistent entities.
///
/// Every map is keyed by canonical (case-folded) identity; the entities
/// themselves keep their submitted display form. The registry holds no
/// locks and performs no I/O; callers serialize writes and drive
/// persistence around it.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    /// type -> name -> target
    targets: HashMap<String, HashMap<String, Target>>,
    /// type -> name -> actor
    actors: HashMap<String, HashMap<String, Actor>>,
    roles: HashMap<String, Role>,
    groups: HashMap<String, Group>,
    policies: HashMap<String, Policy>,
    /// member -> groups it belongs to, maintained on every group write
    member_index: HashMap<GroupMember, HashSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- targets ----

    pub fn get_target(&self, typestr: &str, name: &str) -> Option<&Target> {
        self.targets
            .get(&canonical(typestr))
            .and_then(|typed| typed.get(&canonical(name)))
    }

    /// Absolute upsert; replaces any target with the same identity.
    pub fn put_target(&mut self, target: Target) -> Option<Target> {
        let (typestr, name) = target.key();
        self.targets.entry(typestr).or_default().insert(name, target)
    }

    pub fn remove_target(&mut self, typestr: &str, name: &str) -> Option<Target> {
        self.targets
            .get_mut(&canonical(typestr))
            .and_then(|typed| typed.remove(&canonical(name)))
    }

    pub fn find_targets(&self, name: Option<&str>, typestr: Option<&str>) -> Vec<Target> {
        let name = name.map(canonical);
        let typestr = typestr.map(canonical);

        let mut found = Vec::new();
        for (tkey, typed) in &self.targets {
            if let Some(ref filter) = typestr {
                if tkey != filter {
                    continue;
                }
            }
            for (nkey, target) in typed {
                if let Some(ref filter) = name {
                    if nkey != filter {
                        continue;
                    }
                }
                found.push(target.clone());
            }
        }
        found
    }

    // ---- actors ----

    pub fn get_actor(&self, typestr: &str, name: &str) -> Option<&Actor> {
        self.actors
            .get(&canonical(typestr))
            .and_then(|typed| typed.get(&canonical(name)))
    }

    pub fn put_actor(&mut self, actor: Actor) -> Option<Actor> {
        let (typestr, name) = actor.key();
        self.actors.entry(typestr).or_default().insert(name, actor)
    }

    pub fn remove_actor(&mut self, typestr: &str, name: &str) -> Option<Actor> {
        self.actors
            .get_mut(&canonical(typestr))
            .and_then(|typed| typed.remove(&canonical(name)))
    }

    pub fn find_actors(&self, name: Option<&str>, typestr: Option<&str>) -> Vec<Actor> {
        let name = name.map(canonical);
        let typestr = typestr.map(canonical);

        let mut found = Vec::new();
        for (tkey, typed) in &self.actors {
            if let Some(ref filter) = typestr {
                if tkey != filter {
                    continue;
                }
            }
            for (nkey, actor) in typed {
                if let Some(ref filter) = name {
                    if nkey != filter {
                        continue;
                    }
                }
                found.push(actor.clone());
            }
        }
        found
    }

    // ---- roles ----

    pub fn get_role(&self, name: &str) -> Option<&Role> {
        self.roles.get(&canonical(name))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains_key(&canonical(name))
    }

    pub fn put_role(&mut self, role: Role) -> Option<Role> {
        self.roles.insert(role.key(), role)
    }

    pub fn remove_role(&mut self, name: &str) -> Option<Role> {
        self.roles.remove(&canonical(name))
    }

    pub fn find_roles(&self, name: Option<&str>) -> Vec<Role> {
        match name {
            Some(name) => self.get_role(name).cloned().into_iter().collect(),
            None => self.roles.values().cloned().collect(),
        }
    }

    // ---- groups ----

    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(&canonical(name))
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(&canonical(name))
    }

    pub fn put_group(&mut self, group: Group) -> Option<Group> {
        let key = group.key();
        for member in &group.members {
            self.member_index
                .entry(member.clone())
                .or_default()
                .insert(key.clone());
        }

        let members = group.members.clone();
        let previous = self.groups.insert(key.clone(), group);
        if let Some(ref prev) = previous {
            for member in prev.members.difference(&members) {
                self.unindex_member(member, &key);
            }
        }
        previous
    }

    pub fn remove_group(&mut self, name: &str) -> Option<Group> {
        let key = canonical(name);
        let removed = self.groups.remove(&key);
        if let Some(ref group) = removed {
            for member in &group.members {
                self.unindex_member(member, &key);
            }
        }
        removed
    }

    fn unindex_member(&mut self, member: &GroupMember, group_key: &str) {
        if let Some(groups) = self.member_index.get_mut(member) {
            groups.remove(group_key);
            if groups.is_empty() {
                self.member_index.remove(member);
            }
        }
    }

    /// Groups the given member belongs to.
    pub fn groups_of(&self, member: &GroupMember) -> impl Iterator<Item = &Group> {
        self.member_index
            .get(member)
            .into_iter()
            .flatten()
            .filter_map(|name| self.groups.get(name))
    }

    pub fn find_groups(
        &self,
        name: Option<&str>,
        member: Option<&GroupMember>,
        role: Option<&str>,
    ) -> Vec<Group> {
        let name = name.map(canonical);
        let role = role.map(canonical);

        let mut found = Vec::new();
        for (key, group) in &self.groups {
            if let Some(ref filter) = name {
                if key != filter {
                    continue;
                }
            }
            if let Some(member) = member {
                if !group.members.contains(member) {
                    continue;
                }
            }
            if let Some(ref filter) = role {
                if !group.roles.contains(filter) {
                    continue;
                }
            }
            found.push(group.clone());
        }
        found
    }

    // ---- policies ----

    pub fn get_policy(&self, name: &str) -> Option<&Policy> {
        self.policies.get(&canonical(name))
    }

    pub fn put_policy(&mut self, policy: Policy) -> Option<Policy> {
        self.policies.insert(policy.key(), policy)
    }

    pub fn remove_policy(&mut self, name: &str) -> Option<Policy> {
        self.policies.remove(&canonical(name))
    }

    pub fn find_policies(&self, name: Option<&str>) -> Vec<Policy> {
        match name {
            Some(name) => self.get_policy(name).cloned().into_iter().collect(),
            None => self.policies.values().cloned().collect(),
        }
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    // ---- maintenance ----

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            targets: self.targets.values().map(HashMap::len).sum(),
            actors: self.actors.values().map(HashMap::len).sum(),
            roles: self.roles.len(),
            groups: self.groups.len(),
            policies: self.policies.len(),
        }
    }

    /// Repair the group/role mirror after loading from storage.
    ///
    /// A crash between the writes of a group and its mirrored roles can leave
    /// the persisted sides disagreeing; the union of both directions wins,
    /// and references to entities that no longer exist are dropped.
    pub fn reconcile(&mut self) {
        let group_keys: Vec<String> = self.groups.keys().cloned().collect();
        let role_keys: Vec<String> = self.roles.keys().cloned().collect();

        for group_key in &group_keys {
            let roles: Vec<String> = self.groups[group_key].roles.iter().cloned().collect();
            for role_key in roles {
                match self.roles.get_mut(&role_key) {
                    Some(role) => {
                        role.granted_to.insert(group_key.clone());
                    }
                    None => {
                        warn!(group = %group_key, role = %role_key, "dropping reference to unknown role");
                        if let Some(group) = self.groups.get_mut(group_key) {
                            group.roles.remove(&role_key);
                        }
                    }
                }
            }
        }

        for role_key in &role_keys {
            let granted: Vec<String> = self.roles[role_key].granted_to.iter().cloned().collect();
            for group_key in granted {
                match self.groups.get_mut(&group_key) {
                    Some(group) => {
                        group.roles.insert(role_key.clone());
                    }
                    None => {
                        warn!(role = %role_key, group = %group_key, "dropping grant to unknown group");
                        if let Some(role) = self.roles.get_mut(role_key) {
                            role.granted_to.remove(&group_key);
                        }
                    }
                }
            }
        }
    }
}
