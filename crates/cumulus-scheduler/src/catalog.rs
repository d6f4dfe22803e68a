//! Read-only views of the objects other subsystems own.
//!
//! The scheduler never mutates instances, images or interfaces; it only
//! reads the attributes they expose.

use crate::error::Result;
use crate::metrics::RecordMetricsStore;
use async_trait::async_trait;
use cumulus_core::{object_types, ImageRecord, InstanceSpec, NetworkInterface};
use cumulus_storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Known instances and their network attachments
#[async_trait]
pub trait InstanceCatalog: Send + Sync {
    /// Every known instance, placed or not
    async fn list_instances(&self) -> Result<Vec<InstanceSpec>>;

    /// Network interfaces of one instance
    async fn interfaces(&self, instance_uuid: &str) -> Result<Vec<NetworkInterface>>;
}

/// Cached image copies across the cluster
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Canonical URL for an image reference
    async fn resolve(&self, base: &str) -> Result<String>;

    /// Active copies of the image at `url`, one per hosting node
    async fn active_images(&self, url: &str) -> Result<Vec<ImageRecord>>;
}

/// Short name mapping to a canonical image URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAlias {
    pub name: String,
    pub url: String,
}

/// Catalogs backed by the shared record store
pub struct StoreCatalog {
    store: Arc<RecordStore>,
}

impl StoreCatalog {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Metrics store over the same records
    pub fn metrics_store(&self) -> RecordMetricsStore {
        RecordMetricsStore::new(self.store.clone())
    }
}

#[async_trait]
impl InstanceCatalog for StoreCatalog {
    async fn list_instances(&self) -> Result<Vec<InstanceSpec>> {
        Ok(self.store.list(object_types::INSTANCE)?)
    }

    async fn interfaces(&self, instance_uuid: &str) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .store
            .list_where(object_types::NETWORK_INTERFACE, |i: &NetworkInterface| {
                i.instance_uuid == instance_uuid
            })?)
    }
}

#[async_trait]
impl ImageCatalog for StoreCatalog {
    async fn resolve(&self, base: &str) -> Result<String> {
        let base = base.trim();
        // URLs and paths are never alias names
        if base.is_empty() || base.contains('/') {
            return Ok(base.to_string());
        }

        let alias: Option<ImageAlias> = self.store.load(object_types::IMAGE_ALIAS, base)?;
        Ok(alias.map(|a| a.url).unwrap_or_else(|| base.to_string()))
    }

    async fn active_images(&self, url: &str) -> Result<Vec<ImageRecord>> {
        Ok(self
            .store
            .list_where(object_types::IMAGE, |i: &ImageRecord| {
                i.url == url && i.state.is_active()
            })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::ImageState;
    use cumulus_storage::MemoryBackend;

    fn catalog() -> (Arc<RecordStore>, StoreCatalog) {
        let store = Arc::new(RecordStore::new(Arc::new(MemoryBackend::new())));
        (store.clone(), StoreCatalog::new(store))
    }

    #[tokio::test]
    async fn test_interfaces_for_instance() {
        let (store, catalog) = catalog();
        for (uuid, instance, network) in [("if-1", "i-1", "net-a"), ("if-2", "i-1", "net-b"), ("if-3", "i-2", "net-a")] {
            store
                .save(
                    object_types::NETWORK_INTERFACE,
                    uuid,
                    &NetworkInterface {
                        uuid: uuid.to_string(),
                        instance_uuid: instance.to_string(),
                        network_uuid: network.to_string(),
                    },
                )
                .unwrap();
        }

        let interfaces = catalog.interfaces("i-1").await.unwrap();
        let networks: Vec<_> = interfaces.iter().map(|i| i.network_uuid.as_str()).collect();
        assert_eq!(networks, vec!["net-a", "net-b"]);
        assert!(catalog.interfaces("i-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_image_reference() {
        let (store, catalog) = catalog();
        store
            .save(
                object_types::IMAGE_ALIAS,
                "cirros",
                &ImageAlias {
                    name: "cirros".to_string(),
                    url: "https://images.example.com/cirros-0.6.img".to_string(),
                },
            )
            .unwrap();

        assert_eq!(
            catalog.resolve("cirros").await.unwrap(),
            "https://images.example.com/cirros-0.6.img"
        );
        assert_eq!(
            catalog.resolve(" http://mirror/debian.qcow2 ").await.unwrap(),
            "http://mirror/debian.qcow2"
        );
        assert_eq!(catalog.resolve("unknown").await.unwrap(), "unknown");
        assert_eq!(catalog.resolve("debian/12").await.unwrap(), "debian/12");
    }

    #[tokio::test]
    async fn test_active_images_filters_url_and_state() {
        let (store, catalog) = catalog();
        let images = [
            ("img-1", "http://a", "sf-1", ImageState::Created),
            ("img-2", "http://a", "sf-2", ImageState::Deleted),
            ("img-3", "http://b", "sf-1", ImageState::Created),
        ];
        for (uuid, url, node, state) in images {
            store
                .save(
                    object_types::IMAGE,
                    uuid,
                    &ImageRecord {
                        uuid: uuid.to_string(),
                        url: url.to_string(),
                        node: node.to_string(),
                        state,
                    },
                )
                .unwrap();
        }

        let active = catalog.active_images("http://a").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].node, "sf-1");
    }
}
