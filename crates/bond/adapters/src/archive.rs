//! Content-addressed in-memory archive

use async_trait::async_trait;
use bond_runtime::{ArchiveStore, CollaboratorError};
use bond_types::ArchiveRef;
use dashmap::DashMap;
use tracing::debug;

/// Blobs keyed by `blake3:<hex>` of their content
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: &ArchiveRef) -> Option<Vec<u8>> {
        self.blobs.get(reference.as_str()).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchive {
    async fn store(&self, blob: &[u8]) -> Result<ArchiveRef, CollaboratorError> {
        if blob.is_empty() {
            return Err(CollaboratorError::Rejected {
                collaborator: "archive",
                message: "empty blob".into(),
            });
        }
        let reference = format!("blake3:{}", blake3::hash(blob).to_hex());
        debug!(reference = %reference, bytes = blob.len(), "Blob archived");
        self.blobs.insert(reference.clone(), blob.to_vec());
        Ok(ArchiveRef::new(reference))
    }
}
