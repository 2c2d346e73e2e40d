use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::error::{Error, Result};

use super::{enrollment_key, BiometricGate, ObjectStore, Verification};

/// Object storage held in process memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::TransientStore("in-memory object store lock poisoned".to_string())
}

#[rocket::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().map_err(poisoned)?.get(key).cloned())
    }
}

/// A gate for development and tests: the probe matches iff it is
/// byte-for-byte the enrollment image.
pub struct ExactMatchGate {
    images: Arc<dyn ObjectStore>,
}

impl ExactMatchGate {
    pub fn new(images: Arc<dyn ObjectStore>) -> Self {
        Self { images }
    }
}

#[rocket::async_trait]
impl BiometricGate for ExactMatchGate {
    async fn verify(&self, voter_id: &str, probe: &[u8]) -> Result<Verification> {
        let enrolled = self
            .images
            .fetch(&enrollment_key(voter_id))
            .await?
            .ok_or_else(|| Error::not_found(format!("Face enrollment for voter {voter_id}")))?;

        let verification = if enrolled == probe {
            Verification {
                is_match: true,
                similarity: 100.0,
            }
        } else {
            Verification::no_match()
        };
        debug!("Exact-match verification for {voter_id}: {verification:?}");
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn only_identical_images_match() {
        let images = Arc::new(MemoryObjectStore::new());
        images
            .store(&enrollment_key("V1"), b"face-of-v1".to_vec(), "image/jpeg")
            .await
            .unwrap();
        let gate = ExactMatchGate::new(images);

        let verdict = gate.verify("V1", b"face-of-v1").await.unwrap();
        assert!(verdict.is_match);
        assert_eq!(verdict.similarity, 100.0);

        let verdict = gate.verify("V1", b"someone-else").await.unwrap();
        assert_eq!(verdict, Verification::no_match());

        assert!(matches!(
            gate.verify("V2", b"face-of-v1").await,
            Err(Error::NotFound(_))
        ));
    }
}
