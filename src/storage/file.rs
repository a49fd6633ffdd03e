use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{canonical, Actor, Group, Policy, Role, Target};
use crate::registry::Registry;

use super::traits::{Storage, StorageError, StorageEvent};

const KIND_TARGETS: &str = "targets";
const KIND_ACTORS: &str = "actors";
const KIND_ROLES: &str = "roles";
const KIND_GROUPS: &str = "groups";
const KIND_POLICIES: &str = "policies";

/// Filesystem backend: one JSON document per entity under a per-kind
/// directory, written via a temp file and rename so readers never observe a
/// partial document. Single-node only; there is no watcher.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for kind in [
            KIND_TARGETS,
            KIND_ACTORS,
            KIND_ROLES,
            KIND_GROUPS,
            KIND_POLICIES,
        ] {
            tokio::fs::create_dir_all(root.join(kind)).await?;
        }
        Ok(FileStorage { root })
    }

    fn typed_path(&self, kind: &str, typestr: &str, name: &str) -> PathBuf {
        self.root
            .join(kind)
            .join(format!("{}-{}.json", canonical(typestr), canonical(name)))
    }

    fn named_path(&self, kind: &str, name: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", canonical(name)))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec(value)?;

        // temp file next to the final path, then rename for atomicity
        let mut tmp = path.to_path_buf();
        tmp.set_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            // deleting an entity twice must stay idempotent
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Read every document of one kind, skipping entries that fail to parse
    /// so damage to one kind or file never blocks the rest of the load.
    async fn load_kind<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>, StorageError> {
        let mut entities = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(kind)).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let json = match tokio::fs::read_to_string(&path).await {
                Ok(json) => json,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            match serde_json::from_str(&json) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping corrupt entry");
                }
            }
        }

        Ok(entities)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self) -> Result<Registry, StorageError> {
        let mut registry = Registry::new();

        for target in self.load_kind::<Target>(KIND_TARGETS).await? {
            registry.put_target(target);
        }
        for actor in self.load_kind::<Actor>(KIND_ACTORS).await? {
            registry.put_actor(actor);
        }
        for role in self.load_kind::<Role>(KIND_ROLES).await? {
            registry.put_role(role);
        }
        for group in self.load_kind::<Group>(KIND_GROUPS).await? {
            registry.put_group(group);
        }
        for policy in self.load_kind::<Policy>(KIND_POLICIES).await? {
            registry.put_policy(policy);
        }

        registry.reconcile();
        let stats = registry.stats();
        debug!(
            root = %self.root.display(),
            targets = stats.targets,
            actors = stats.actors,
            roles = stats.roles,
            groups = stats.groups,
            policies = stats.policies,
            "loaded registry from filesystem"
        );
        Ok(registry)
    }

    async fn put_target(&self, target: &Target) -> Result<(), StorageError> {
        let path = self.typed_path(KIND_TARGETS, &target.typestr, &target.name);
        self.write_json(&path, target).await
    }

    async fn delete_target(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.delete(&self.typed_path(KIND_TARGETS, typestr, name)).await
    }

    async fn put_actor(&self, actor: &Actor) -> Result<(), StorageError> {
        let path = self.typed_path(KIND_ACTORS, &actor.typestr, &actor.name);
        self.write_json(&path, actor).await
    }

    async fn delete_actor(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.delete(&self.typed_path(KIND_ACTORS, typestr, name)).await
    }

    async fn put_role(&self, role: &Role) -> Result<(), StorageError> {
        let path = self.named_path(KIND_ROLES, &role.name);
        self.write_json(&path, role).await
    }

    async fn delete_role(&self, name: &str) -> Result<(), StorageError> {
        self.delete(&self.named_path(KIND_ROLES, name)).await
    }

    async fn put_group(&self, group: &Group) -> Result<(), StorageError> {
        let path = self.named_path(KIND_GROUPS, &group.name);
        self.write_json(&path, group).await
    }

    async fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        self.delete(&self.named_path(KIND_GROUPS, name)).await
    }

    async fn put_policy(&self, policy: &Policy) -> Result<(), StorageError> {
        let path = self.named_path(KIND_POLICIES, &policy.name);
        self.write_json(&path, policy).await
    }

    async fn delete_policy(&self, name: &str) -> Result<(), StorageError> {
        self.delete(&self.named_path(KIND_POLICIES, name)).await
    }

    fn watch(&self) -> Option<mpsc::Receiver<StorageEvent>> {
        None
    }
}
