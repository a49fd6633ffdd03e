use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{canonical, Actor, Group, Policy, Role, Target};
use crate::registry::Registry;

use super::traits::{Storage, StorageError, StorageEvent};

/// Ephemeral in-process backend.
///
/// Used by tests and by `memory:` deployments where persistence across
/// restarts is not wanted.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    targets: Mutex<HashMap<(String, String), Target>>,
    actors: Mutex<HashMap<(String, String), Actor>>,
    roles: Mutex<HashMap<String, Role>>,
    groups: Mutex<HashMap<String, Group>>,
    policies: Mutex<HashMap<String, Policy>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a backend error (for testing rollback).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<Registry, StorageError> {
        let mut registry = Registry::new();
        for target in self.targets.lock().values() {
            registry.put_target(target.clone());
        }
        for actor in self.actors.lock().values() {
            registry.put_actor(actor.clone());
        }
        for role in self.roles.lock().values() {
            registry.put_role(role.clone());
        }
        for group in self.groups.lock().values() {
            registry.put_group(group.clone());
        }
        for policy in self.policies.lock().values() {
            registry.put_policy(policy.clone());
        }
        registry.reconcile();
        Ok(registry)
    }

    async fn put_target(&self, target: &Target) -> Result<(), StorageError> {
        self.guard()?;
        self.targets.lock().insert(target.key(), target.clone());
        Ok(())
    }

    async fn delete_target(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.targets
            .lock()
            .remove(&(canonical(typestr), canonical(name)));
        Ok(())
    }

    async fn put_actor(&self, actor: &Actor) -> Result<(), StorageError> {
        self.guard()?;
        self.actors.lock().insert(actor.key(), actor.clone());
        Ok(())
    }

    async fn delete_actor(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.actors
            .lock()
            .remove(&(canonical(typestr), canonical(name)));
        Ok(())
    }

    async fn put_role(&self, role: &Role) -> Result<(), StorageError> {
        self.guard()?;
        self.roles.lock().insert(role.key(), role.clone());
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.roles.lock().remove(&canonical(name));
        Ok(())
    }

    async fn put_group(&self, group: &Group) -> Result<(), StorageError> {
        self.guard()?;
        self.groups.lock().insert(group.key(), group.clone());
        Ok(())
    }

    async fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.groups.lock().remove(&canonical(name));
        Ok(())
    }

    async fn put_policy(&self, policy: &Policy) -> Result<(), StorageError> {
        self.guard()?;
        self.policies.lock().insert(policy.key(), policy.clone());
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.policies.lock().remove(&canonical(name));
        Ok(())
    }

    fn watch(&self) -> Option<mpsc::Receiver<StorageEvent>> {
        None
    }
}
