pub mod etcd;
pub mod file;
pub mod memory;
pub mod traits;

pub use etcd::EtcdStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use traits::{Storage, StorageError, StorageEvent};

use std::sync::Arc;

use crate::config::StorageBackend;

/// Open the backend selected by `GATESTORAGE`.
pub async fn connect(backend: &StorageBackend) -> Result<Arc<dyn Storage>, StorageError> {
    match backend {
        StorageBackend::File(path) => Ok(Arc::new(FileStorage::open(path.clone()).await?)),
        StorageBackend::Etcd(url) => Ok(Arc::new(EtcdStorage::connect(url).await?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}
