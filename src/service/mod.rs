use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::request::{
    AddActorRequest, AddGroupRequest, AddRoleRequest, AddTargetRequest, CheckRequest,
    ModifyActorRequest, ModifyGroupRequest, ModifyRoleRequest, ModifyTargetRequest,
};
use crate::domain::{
    canonical, to_attribute_map, Actor, Decision, Group, GroupMember, Policy, Role, Target,
};
use crate::engine::{self, CheckContext};
use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryStats};
use crate::storage::{Storage, StorageError, StorageEvent};

/// The policy decision point: one shared registry, one storage driver.
///
/// Admin writes run one at a time: each takes the writer mutex, validates
/// against a read snapshot, persists with a deadline, and only then commits
/// under the registry's write lock, so a persistence failure leaves the
/// registry exactly as it was and no two writers can compute mirrored
/// entities from the same stale snapshot. Checks evaluate entirely under a
/// read lock, never suspend, and never contend with the writer mutex.
pub struct Gatehouse {
    registry: RwLock<Registry>,
    /// Serializes the whole validate, persist, commit sequence of an admin
    /// write. The registry's write lock alone only makes the final commit
    /// atomic, which is not enough when two writes touch the same
    /// group/role mirror.
    writer: Mutex<()>,
    storage: Arc<dyn Storage>,
    storage_timeout: Duration,
    started_at: Instant,
}

impl Gatehouse {
    /// Load the registry from storage and wrap it for serving.
    pub async fn load(storage: Arc<dyn Storage>, storage_timeout: Duration) -> Result<Arc<Self>> {
        let registry = storage
            .load()
            .await
            .map_err(|err| Error::StorageUnavailable(err.to_string()))?;

        let stats = registry.stats();
        info!(
            targets = stats.targets,
            actors = stats.actors,
            roles = stats.roles,
            groups = stats.groups,
            policies = stats.policies,
            "registry loaded"
        );

        Ok(Arc::new(Gatehouse {
            registry: RwLock::new(registry),
            writer: Mutex::new(()),
            storage,
            storage_timeout,
            started_at: Instant::now(),
        }))
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.read().stats()
    }

    /// Apply peer changes from the storage watch stream until it closes.
    /// Applied events are not re-persisted.
    pub fn spawn_watcher(self: &Arc<Self>, mut events: mpsc::Receiver<StorageEvent>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                service.apply_event(event);
            }
            info!("storage watch stream ended");
        })
    }

    fn apply_event(&self, event: StorageEvent) {
        let mut registry = self.registry.write();
        match event {
            StorageEvent::PutTarget(target) => {
                registry.put_target(target);
            }
            StorageEvent::DeleteTarget { typestr, name } => {
                registry.remove_target(&typestr, &name);
            }
            StorageEvent::PutActor(actor) => {
                registry.put_actor(actor);
            }
            StorageEvent::DeleteActor { typestr, name } => {
                registry.remove_actor(&typestr, &name);
            }
            StorageEvent::PutRole(role) => {
                registry.put_role(role);
            }
            StorageEvent::DeleteRole { name } => {
                registry.remove_role(&name);
            }
            StorageEvent::PutGroup(group) => {
                registry.put_group(group);
            }
            StorageEvent::DeleteGroup { name } => {
                registry.remove_group(&name);
            }
            StorageEvent::PutPolicy(policy) => {
                registry.put_policy(policy);
            }
            StorageEvent::DeletePolicy { name } => {
                registry.remove_policy(&name);
            }
        }
    }

    /// Run one persistence call under the configured deadline.
    async fn persist<F>(&self, op: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), StorageError>>,
    {
        match tokio::time::timeout(self.storage_timeout, op).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(error = %err, "persistence failed, rolling back");
                Err(Error::StorageUnavailable(err.to_string()))
            }
            Err(_) => {
                warn!(timeout_secs = self.storage_timeout.as_secs(), "persistence deadline exceeded");
                Err(Error::StorageUnavailable("deadline exceeded".to_string()))
            }
        }
    }

    // ---- targets ----

    pub async fn add_target(&self, req: AddTargetRequest) -> Result<Target> {
        validate_identity(&req.name, &req.typestr)?;
        let _writer = self.writer.lock().await;

        if self.registry.read().get_target(&req.typestr, &req.name).is_some() {
            return Err(Error::exists(format!("target {}/{}", req.typestr, req.name)));
        }

        let target = Target::new(
            &req.name,
            &req.typestr,
            req.actions,
            to_attribute_map(req.attributes),
        );

        self.persist(self.storage.put_target(&target)).await?;
        self.registry.write().put_target(target.clone());

        info!(typestr = %target.typestr, name = %target.name, "added target");
        Ok(target)
    }

    pub async fn modify_target(
        &self,
        typestr: &str,
        name: &str,
        req: ModifyTargetRequest,
    ) -> Result<Target> {
        let _writer = self.writer.lock().await;

        let mut updated = self
            .registry
            .read()
            .get_target(typestr, name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("target {typestr}/{name}")))?;

        updated.add_actions(&req.add_actions);
        updated.remove_actions(&req.remove_actions);
        updated.add_attributes(&req.add_attributes);
        updated.remove_attributes(&req.remove_attributes);

        self.persist(self.storage.put_target(&updated)).await?;
        self.registry.write().put_target(updated.clone());

        info!(typestr = %updated.typestr, name = %updated.name, "modified target");
        Ok(updated)
    }

    pub async fn remove_target(&self, typestr: &str, name: &str) -> Result<Target> {
        let _writer = self.writer.lock().await;

        let existing = self
            .registry
            .read()
            .get_target(typestr, name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("target {typestr}/{name}")))?;

        self.persist(self.storage.delete_target(typestr, name)).await?;
        self.registry.write().remove_target(typestr, name);

        info!(typestr = %existing.typestr, name = %existing.name, "removed target");
        Ok(existing)
    }

    pub fn get_targets(&self, name: Option<&str>, typestr: Option<&str>) -> Vec<Target> {
        self.registry.read().find_targets(name, typestr)
    }

    // ---- actors ----

    pub async fn add_actor(&self, req: AddActorRequest) -> Result<Actor> {
        validate_identity(&req.name, &req.typestr)?;
        let _writer = self.writer.lock().await;

        if self.registry.read().get_actor(&req.typestr, &req.name).is_some() {
            return Err(Error::exists(format!("actor {}/{}", req.typestr, req.name)));
        }

        let actor = Actor::new(&req.name, &req.typestr, to_attribute_map(req.attributes));

        self.persist(self.storage.put_actor(&actor)).await?;
        self.registry.write().put_actor(actor.clone());

        info!(typestr = %actor.typestr, name = %actor.name, "added actor");
        Ok(actor)
    }

    pub async fn modify_actor(
        &self,
        typestr: &str,
        name: &str,
        req: ModifyActorRequest,
    ) -> Result<Actor> {
        let _writer = self.writer.lock().await;

        let mut updated = self
            .registry
            .read()
            .get_actor(typestr, name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("actor {typestr}/{name}")))?;

        updated.add_attributes(&req.add_attributes);
        updated.remove_attributes(&req.remove_attributes);

        self.persist(self.storage.put_actor(&updated)).await?;
        self.registry.write().put_actor(updated.clone());

        info!(typestr = %updated.typestr, name = %updated.name, "modified actor");
        Ok(updated)
    }

    pub async fn remove_actor(&self, typestr: &str, name: &str) -> Result<Actor> {
        let _writer = self.writer.lock().await;

        let existing = self
            .registry
            .read()
            .get_actor(typestr, name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("actor {typestr}/{name}")))?;

        self.persist(self.storage.delete_actor(typestr, name)).await?;
        self.registry.write().remove_actor(typestr, name);

        info!(typestr = %existing.typestr, name = %existing.name, "removed actor");
        Ok(existing)
    }

    /// Registered actors, expanded with their derived group and role
    /// attributes so callers see what a check would see.
    pub fn get_actors(&self, name: Option<&str>, typestr: Option<&str>) -> Vec<Actor> {
        let registry = self.registry.read();
        registry
            .find_actors(name, typestr)
            .into_iter()
            .map(|mut actor| {
                engine::expand_groups_and_roles(&registry, &mut actor);
                actor
            })
            .collect()
    }

    // ---- roles ----

    pub async fn add_role(&self, req: AddRoleRequest) -> Result<Role> {
        validate_name("role", &req.name)?;
        let _writer = self.writer.lock().await;

        let mut granted_to = std::collections::HashSet::new();
        let mut changed_groups = Vec::new();
        {
            let registry = self.registry.read();
            if registry.get_role(&req.name).is_some() {
                return Err(Error::exists(format!("role {}", req.name)));
            }
            for group_name in &req.granted_to {
                let group = registry
                    .get_group(group_name)
                    .ok_or_else(|| Error::reference(format!("group {group_name} does not exist")))?;
                let mut mirrored = group.clone();
                mirrored.roles.insert(canonical(&req.name));
                changed_groups.push(mirrored);
                granted_to.insert(canonical(group_name));
            }
        }

        let role = Role::new(&req.name, req.desc, granted_to);

        self.persist(self.storage.put_role(&role)).await?;
        for group in &changed_groups {
            self.persist(self.storage.put_group(group)).await?;
        }

        let mut registry = self.registry.write();
        registry.put_role(role.clone());
        for group in changed_groups {
            registry.put_group(group);
        }
        drop(registry);

        info!(name = %role.name, "added role");
        Ok(role)
    }

    pub async fn modify_role(&self, name: &str, req: ModifyRoleRequest) -> Result<Role> {
        let _writer = self.writer.lock().await;

        let mut changed_groups = Vec::new();
        let mut updated = {
            let registry = self.registry.read();
            let mut updated = registry
                .get_role(name)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("role {name}")))?;

            if let Some(desc) = req.desc {
                updated.desc = Some(desc);
            }

            for group_name in &req.add_granted_to {
                let group = registry
                    .get_group(group_name)
                    .ok_or_else(|| Error::reference(format!("group {group_name} does not exist")))?;
                let mut mirrored = group.clone();
                mirrored.roles.insert(updated.key());
                changed_groups.push(mirrored);
                updated.granted_to.insert(canonical(group_name));
            }

            for group_name in &req.remove_granted_to {
                updated.granted_to.remove(&canonical(group_name));
                // a vanished group needs no mirror update
                if let Some(group) = registry.get_group(group_name) {
                    let mut mirrored = group.clone();
                    mirrored.roles.remove(&updated.key());
                    changed_groups.push(mirrored);
                }
            }

            updated
        };

        if updated.desc.as_deref() == Some("") {
            updated.desc = None;
        }

        self.persist(self.storage.put_role(&updated)).await?;
        for group in &changed_groups {
            self.persist(self.storage.put_group(group)).await?;
        }

        let mut registry = self.registry.write();
        registry.put_role(updated.clone());
        for group in changed_groups {
            registry.put_group(group);
        }
        drop(registry);

        info!(name = %updated.name, "modified role");
        Ok(updated)
    }

    pub async fn remove_role(&self, name: &str) -> Result<Role> {
        let _writer = self.writer.lock().await;

        let (existing, changed_groups) = {
            let registry = self.registry.read();
            let existing = registry
                .get_role(name)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("role {name}")))?;

            let mut changed_groups = Vec::new();
            for group_name in &existing.granted_to {
                if let Some(group) = registry.get_group(group_name) {
                    let mut mirrored = group.clone();
                    mirrored.roles.remove(&existing.key());
                    changed_groups.push(mirrored);
                }
            }
            (existing, changed_groups)
        };

        self.persist(self.storage.delete_role(name)).await?;
        for group in &changed_groups {
            self.persist(self.storage.put_group(group)).await?;
        }

        let mut registry = self.registry.write();
        registry.remove_role(name);
        for group in changed_groups {
            registry.put_group(group);
        }
        drop(registry);

        info!(name = %existing.name, "removed role");
        Ok(existing)
    }

    pub fn get_roles(&self, name: Option<&str>) -> Vec<Role> {
        self.registry.read().find_roles(name)
    }

    // ---- groups ----

    pub async fn add_group(&self, req: AddGroupRequest) -> Result<Group> {
        validate_name("group", &req.name)?;
        let _writer = self.writer.lock().await;

        let members = req
            .members
            .iter()
            .map(|m| GroupMember::new(&m.name, &m.typestr))
            .collect();

        let mut roles = std::collections::HashSet::new();
        let mut changed_roles = Vec::new();
        {
            let registry = self.registry.read();
            if registry.get_group(&req.name).is_some() {
                return Err(Error::exists(format!("group {}", req.name)));
            }
            for role_name in &req.roles {
                let role = registry
                    .get_role(role_name)
                    .ok_or_else(|| Error::reference(format!("role {role_name} does not exist")))?;
                let mut mirrored = role.clone();
                mirrored.granted_to.insert(canonical(&req.name));
                changed_roles.push(mirrored);
                roles.insert(canonical(role_name));
            }
        }

        let group = Group::new(&req.name, req.desc, members, roles);

        self.persist(self.storage.put_group(&group)).await?;
        for role in &changed_roles {
            self.persist(self.storage.put_role(role)).await?;
        }

        let mut registry = self.registry.write();
        registry.put_group(group.clone());
        for role in changed_roles {
            registry.put_role(role);
        }
        drop(registry);

        info!(name = %group.name, "added group");
        Ok(group)
    }

    pub async fn modify_group(&self, name: &str, req: ModifyGroupRequest) -> Result<Group> {
        let _writer = self.writer.lock().await;

        let mut changed_roles = Vec::new();
        let mut updated = {
            let registry = self.registry.read();
            let mut updated = registry
                .get_group(name)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("group {name}")))?;

            if let Some(desc) = req.desc {
                updated.desc = Some(desc);
            }

            for member in &req.add_members {
                updated.members.insert(GroupMember::new(&member.name, &member.typestr));
            }
            for member in &req.remove_members {
                updated.members.remove(&GroupMember::new(&member.name, &member.typestr));
            }

            for role_name in &req.add_roles {
                let role = registry
                    .get_role(role_name)
                    .ok_or_else(|| Error::reference(format!("role {role_name} does not exist")))?;
                let mut mirrored = role.clone();
                mirrored.granted_to.insert(updated.key());
                changed_roles.push(mirrored);
                updated.roles.insert(canonical(role_name));
            }

            for role_name in &req.remove_roles {
                updated.roles.remove(&canonical(role_name));
                // a vanished role needs no mirror update
                if let Some(role) = registry.get_role(role_name) {
                    let mut mirrored = role.clone();
                    mirrored.granted_to.remove(&updated.key());
                    changed_roles.push(mirrored);
                }
            }

            updated
        };

        if updated.desc.as_deref() == Some("") {
            updated.desc = None;
        }

        self.persist(self.storage.put_group(&updated)).await?;
        for role in &changed_roles {
            self.persist(self.storage.put_role(role)).await?;
        }

        let mut registry = self.registry.write();
        registry.put_group(updated.clone());
        for role in changed_roles {
            registry.put_role(role);
        }
        drop(registry);

        info!(name = %updated.name, "modified group");
        Ok(updated)
    }

    pub async fn remove_group(&self, name: &str) -> Result<Group> {
        let _writer = self.writer.lock().await;

        let (existing, changed_roles) = {
            let registry = self.registry.read();
            let existing = registry
                .get_group(name)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("group {name}")))?;

            let mut changed_roles = Vec::new();
            for role_name in &existing.roles {
                if let Some(role) = registry.get_role(role_name) {
                    let mut mirrored = role.clone();
                    mirrored.granted_to.remove(&existing.key());
                    changed_roles.push(mirrored);
                }
            }
            (existing, changed_roles)
        };

        self.persist(self.storage.delete_group(name)).await?;
        for role in &changed_roles {
            self.persist(self.storage.put_role(role)).await?;
        }

        let mut registry = self.registry.write();
        registry.remove_group(name);
        for role in changed_roles {
            registry.put_role(role);
        }
        drop(registry);

        info!(name = %existing.name, "removed group");
        Ok(existing)
    }

    pub fn get_groups(
        &self,
        name: Option<&str>,
        member: Option<&GroupMember>,
        role: Option<&str>,
    ) -> Vec<Group> {
        self.registry.read().find_groups(name, member, role)
    }

    // ---- policies ----

    pub async fn add_policy(&self, rule: Policy) -> Result<Policy> {
        validate_name("policy", &rule.name)?;
        let _writer = self.writer.lock().await;

        if self.registry.read().get_policy(&rule.name).is_some() {
            return Err(Error::exists(format!("policy {}", rule.name)));
        }

        self.persist(self.storage.put_policy(&rule)).await?;
        self.registry.write().put_policy(rule.clone());

        info!(name = %rule.name, decision = %rule.decision, "added policy");
        Ok(rule)
    }

    /// Whole-rule replacement keyed by name.
    pub async fn replace_policy(&self, name: &str, rule: Policy) -> Result<Policy> {
        validate_name("policy", &rule.name)?;
        if canonical(name) != rule.key() {
            return Err(Error::invalid(format!(
                "policy name {} does not match path {name}",
                rule.name
            )));
        }
        let _writer = self.writer.lock().await;

        if self.registry.read().get_policy(name).is_none() {
            return Err(Error::not_found(format!("policy {name}")));
        }

        self.persist(self.storage.put_policy(&rule)).await?;
        self.registry.write().put_policy(rule.clone());

        info!(name = %rule.name, decision = %rule.decision, "replaced policy");
        Ok(rule)
    }

    pub async fn remove_policy(&self, name: &str) -> Result<Policy> {
        let _writer = self.writer.lock().await;

        let existing = self
            .registry
            .read()
            .get_policy(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("policy {name}")))?;

        self.persist(self.storage.delete_policy(name)).await?;
        self.registry.write().remove_policy(name);

        info!(name = %existing.name, "removed policy");
        Ok(existing)
    }

    pub fn get_policies(&self, name: Option<&str>) -> Vec<Policy> {
        self.registry.read().find_policies(name)
    }

    // ---- checks ----

    /// Evaluate one authorization check. Synchronous: the whole evaluation
    /// runs under a read snapshot of the registry without suspending.
    pub fn check(&self, req: CheckRequest) -> Result<Decision> {
        validate_identity(&req.actor.name, &req.actor.typestr)?;
        validate_identity(&req.target_name, &req.target_type)?;

        let actor = Actor::new(
            &req.actor.name,
            &req.actor.typestr,
            to_attribute_map(req.actor.attributes),
        );

        let registry = self.registry.read();
        let ctx = CheckContext::build(
            &registry,
            actor,
            to_attribute_map(req.env_attributes),
            &req.target_name,
            &req.target_type,
            &req.target_action,
        );
        let decision = engine::resolve(registry.policies(), &ctx);
        drop(registry);

        let actor_id = format!("{}/{}", ctx.actor.typestr, ctx.actor.name);
        let target_id = format!("{}/{}", ctx.target_type, ctx.target_name);
        info!(
            actor = %actor_id,
            target = %target_id,
            action = %ctx.target_action,
            decision = %decision,
            "check"
        );
        Ok(decision)
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{kind} name must not be empty")));
    }
    if name.contains('/') {
        return Err(Error::invalid(format!("{kind} name must not contain '/'")));
    }
    Ok(())
}

fn validate_identity(name: &str, typestr: &str) -> Result<()> {
    validate_name("entity", name)?;
    if typestr.is_empty() {
        return Err(Error::invalid("type must not be empty".to_string()));
    }
    if typestr.contains('/') {
        return Err(Error::invalid("type must not contain '/'".to_string()));
    }
    Ok(())
}
