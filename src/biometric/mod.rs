//! Face verification gating every ballot, and storage of enrollment images.

use serde::{Deserialize, Serialize};

use crate::error::Result;

mod memory;
mod rekognition;
mod s3;

pub use memory::{ExactMatchGate, MemoryObjectStore};
pub use rekognition::RekognitionGate;
pub use s3::S3ObjectStore;

/// Default minimum similarity (0-100) for a face match.
pub const DEFAULT_FACE_SIMILARITY: f32 = 75.0;

/// Content type assumed for enrollment images.
pub const ENROLLMENT_CONTENT_TYPE: &str = "image/jpeg";

/// Where a voter's enrollment image is stored.
pub fn enrollment_key(voter_id: &str) -> String {
    format!("faces/{voter_id}.jpg")
}

/// Outcome of comparing a probe image against a voter's enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_match: bool,
    /// Similarity score in `0.0..=100.0`.
    pub similarity: f32,
}

impl Verification {
    pub fn no_match() -> Self {
        Self {
            is_match: false,
            similarity: 0.0,
        }
    }
}

/// Decides whether a probe image shows the enrolled voter.
#[rocket::async_trait]
pub trait BiometricGate: Send + Sync {
    async fn verify(&self, voter_id: &str, probe: &[u8]) -> Result<Verification>;
}

/// Blob storage for enrollment images.
#[rocket::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// The stored bytes, or `None` if nothing is stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;
}
