use etcd_client::{Client, EventType, GetOptions, WatchOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{canonical, Actor, Group, Policy, Role, Target};
use crate::registry::Registry;

use super::traits::{Storage, StorageError, StorageEvent};

const PREFIX: &str = "/gatehouse";
const WATCH_BUFFER: usize = 256;

/// Replicated backend: one etcd key per entity under a per-kind prefix.
///
/// Writes race with remote writes for the same key; the winner is whichever
/// carries the higher etcd revision, and a superseded local write simply
/// gets overwritten by the watch event that follows. Peer changes arrive on
/// the watch stream and are applied to the registry without re-persisting.
pub struct EtcdStorage {
    client: Client,
    events: Mutex<Option<mpsc::Receiver<StorageEvent>>>,
}

impl EtcdStorage {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = Client::connect([url], None).await?;

        // probe so a bad endpoint fails startup instead of the first write
        client
            .kv_client()
            .get(PREFIX, Some(GetOptions::new().with_prefix().with_keys_only()))
            .await?;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let (watcher, mut stream) = client
            .watch_client()
            .watch(PREFIX, Some(WatchOptions::new().with_prefix()))
            .await?;
        info!(url, prefix = PREFIX, "watching etcd for peer changes");

        tokio::spawn(async move {
            // the watcher handle must outlive the stream
            let _watcher = watcher;

            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            if let Some(update) = translate_event(event) {
                                if tx.send(update).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        warn!("etcd watch stream closed");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "etcd watch stream failed");
                        return;
                    }
                }
            }
        });

        Ok(EtcdStorage {
            client,
            events: Mutex::new(Some(rx)),
        })
    }

    fn typed_key(kind: &str, typestr: &str, name: &str) -> String {
        format!("{PREFIX}/{kind}/{}/{}", canonical(typestr), canonical(name))
    }

    fn named_key(kind: &str, name: &str) -> String {
        format!("{PREFIX}/{kind}/{}", canonical(name))
    }

    async fn put_json<T: serde::Serialize>(&self, key: String, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.client.kv_client().put(key, json, None).await?;
        Ok(())
    }

    async fn delete_key(&self, key: String) -> Result<(), StorageError> {
        self.client.kv_client().delete(key, None).await?;
        Ok(())
    }

    /// Fetch every entity of one kind, skipping values that fail to parse so
    /// damage to one kind never blocks the rest of the load.
    async fn load_kind<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>, StorageError> {
        let prefix = format!("{PREFIX}/{kind}/");
        let resp = self
            .client
            .kv_client()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let mut entities = Vec::new();
        for kv in resp.kvs() {
            match kv.value_str().map_err(StorageError::from).and_then(|json| {
                serde_json::from_str::<T>(json).map_err(StorageError::from)
            }) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    let key = kv.key_str().unwrap_or("<binary>");
                    warn!(key, error = %err, "skipping corrupt entry");
                }
            }
        }
        Ok(entities)
    }
}

/// Map a watch event onto a registry update. Unrecognized keys and corrupt
/// values are logged and dropped.
fn translate_event(event: &etcd_client::Event) -> Option<StorageEvent> {
    let kv = event.kv()?;
    let key = match kv.key_str() {
        Ok(key) => key,
        Err(err) => {
            warn!(error = %err, "ignoring watch event with non-utf8 key");
            return None;
        }
    };

    let rest = key.strip_prefix(PREFIX)?.strip_prefix('/')?;
    let (kind, ident) = rest.split_once('/')?;

    match event.event_type() {
        EventType::Put => {
            let json = match kv.value_str() {
                Ok(json) => json,
                Err(err) => {
                    warn!(key, error = %err, "ignoring watch event with non-utf8 value");
                    return None;
                }
            };
            let parsed = match kind {
                "targets" => serde_json::from_str(json).map(StorageEvent::PutTarget),
                "actors" => serde_json::from_str(json).map(StorageEvent::PutActor),
                "roles" => serde_json::from_str(json).map(StorageEvent::PutRole),
                "groups" => serde_json::from_str(json).map(StorageEvent::PutGroup),
                "policies" => serde_json::from_str(json).map(StorageEvent::PutPolicy),
                _ => return None,
            };
            match parsed {
                Ok(update) => {
                    debug!(key, "applying peer update");
                    Some(update)
                }
                Err(err) => {
                    warn!(key, error = %err, "ignoring corrupt peer update");
                    None
                }
            }
        }
        EventType::Delete => match kind {
            "targets" | "actors" => {
                let (typestr, name) = ident.split_once('/')?;
                let typestr = typestr.to_string();
                let name = name.to_string();
                Some(if kind == "targets" {
                    StorageEvent::DeleteTarget { typestr, name }
                } else {
                    StorageEvent::DeleteActor { typestr, name }
                })
            }
            "roles" => Some(StorageEvent::DeleteRole {
                name: ident.to_string(),
            }),
            "groups" => Some(StorageEvent::DeleteGroup {
                name: ident.to_string(),
            }),
            "policies" => Some(StorageEvent::DeletePolicy {
                name: ident.to_string(),
            }),
            _ => None,
        },
    }
}

#[async_trait]
impl Storage for EtcdStorage {
    async fn load(&self) -> Result<Registry, StorageError> {
        let mut registry = Registry::new();

        for target in self.load_kind::<Target>("targets").await? {
            registry.put_target(target);
        }
        for actor in self.load_kind::<Actor>("actors").await? {
            registry.put_actor(actor);
        }
        for role in self.load_kind::<Role>("roles").await? {
            registry.put_role(role);
        }
        for group in self.load_kind::<Group>("groups").await? {
            registry.put_group(group);
        }
        for policy in self.load_kind::<Policy>("policies").await? {
            registry.put_policy(policy);
        }

        registry.reconcile();
        Ok(registry)
    }

    async fn put_target(&self, target: &Target) -> Result<(), StorageError> {
        self.put_json(Self::typed_key("targets", &target.typestr, &target.name), target)
            .await
    }

    async fn delete_target(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.delete_key(Self::typed_key("targets", typestr, name)).await
    }

    async fn put_actor(&self, actor: &Actor) -> Result<(), StorageError> {
        self.put_json(Self::typed_key("actors", &actor.typestr, &actor.name), actor)
            .await
    }

    async fn delete_actor(&self, typestr: &str, name: &str) -> Result<(), StorageError> {
        self.delete_key(Self::typed_key("actors", typestr, name)).await
    }

    async fn put_role(&self, role: &Role) -> Result<(), StorageError> {
        self.put_json(Self::named_key("roles", &role.name), role).await
    }

    async fn delete_role(&self, name: &str) -> Result<(), StorageError> {
        self.delete_key(Self::named_key("roles", name)).await
    }

    async fn put_group(&self, group: &Group) -> Result<(), StorageError> {
        self.put_json(Self::named_key("groups", &group.name), group).await
    }

    async fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        self.delete_key(Self::named_key("groups", name)).await
    }

    async fn put_policy(&self, policy: &Policy) -> Result<(), StorageError> {
        self.put_json(Self::named_key("policies", &policy.name), policy)
            .await
    }

    async fn delete_policy(&self, name: &str) -> Result<(), StorageError> {
        self.delete_key(Self::named_key("policies", name)).await
    }

    fn watch(&self) -> Option<mpsc::Receiver<StorageEvent>> {
        self.events.lock().take()
    }
}
