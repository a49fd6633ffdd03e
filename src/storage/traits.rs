use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{Actor, Group, Policy, Role, Target};
use crate::registry::Registry;

/// Errors reported by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("{0}")]
    Backend(String),
}

/// A change made by a peer node, observed through the backend.
///
/// Applying an event to the registry is an absolute upsert or removal, so
/// replaying the same event converges to the same state.
#[derive(Debug)]
pub enum StorageEvent {
    PutTarget(Target),
    DeleteTarget { typestr: String, name: String },
    PutActor(Actor),
    DeleteActor { typestr: String, name: String },
    PutRole(Role),
    DeleteRole { name: String },
    PutGroup(Group),
    DeleteGroup { name: String },
    PutPolicy(Policy),
    DeletePolicy { name: String },
}

/// Durable backing for the registry.
///
/// `load` runs once at startup; the `put_*`/`delete_*` calls run after a
/// write has passed in-memory validation and before it is committed, so a
/// failure here leaves the registry untouched.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self) -> Result<Registry, StorageError>;

    async fn put_target(&self, target: &Target) -> Result<(), StorageError>;
    async fn delete_target(&self, typestr: &str, name: &str) -> Result<(), StorageError>;

    async fn put_actor(&self, actor: &Actor) -> Result<(), StorageError>;
    async fn delete_actor(&self, typestr: &str, name: &str) -> Result<(), StorageError>;

    async fn put_role(&self, role: &Role) -> Result<(), StorageError>;
    async fn delete_role(&self, name: &str) -> Result<(), StorageError>;

    async fn put_group(&self, group: &Group) -> Result<(), StorageError>;
    async fn delete_group(&self, name: &str) -> Result<(), StorageError>;

    async fn put_policy(&self, policy: &Policy) -> Result<(), StorageError>;
    async fn delete_policy(&self, name: &str) -> Result<(), StorageError>;

    /// Stream of peer changes, taken once at startup.
    /// Single-node backends return `None`.
    fn watch(&self) -> Option<mpsc::Receiver<StorageEvent>>;
}
