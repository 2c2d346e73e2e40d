use std::sync::Arc;

use aws_sdk_rekognition::{primitives::Blob, types::Image, Client as RekognitionClient};
use log::{debug, warn};

use crate::error::{Error, Result};

use super::{enrollment_key, BiometricGate, ObjectStore, Verification};

/// Compares the probe against the enrollment image with Amazon Rekognition.
pub struct RekognitionGate {
    client: RekognitionClient,
    images: Arc<dyn ObjectStore>,
    threshold: f32,
}

impl RekognitionGate {
    pub fn new(client: RekognitionClient, images: Arc<dyn ObjectStore>, threshold: f32) -> Self {
        Self {
            client,
            images,
            threshold,
        }
    }
}

#[rocket::async_trait]
impl BiometricGate for RekognitionGate {
    async fn verify(&self, voter_id: &str, probe: &[u8]) -> Result<Verification> {
        let enrolled = self
            .images
            .fetch(&enrollment_key(voter_id))
            .await?
            .ok_or_else(|| Error::not_found(format!("Face enrollment for voter {voter_id}")))?;

        let response = self
            .client
            .compare_faces()
            .source_image(Image::builder().bytes(Blob::new(enrolled)).build())
            .target_image(Image::builder().bytes(Blob::new(probe.to_vec())).build())
            .similarity_threshold(self.threshold)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                // Raised when either image contains no detectable face.
                if err.is_invalid_parameter_exception() {
                    warn!("No comparable face for voter {voter_id}: {err}");
                    return Ok(Verification::no_match());
                }
                return Err(Error::TransientStore(format!(
                    "Rekognition CompareFaces failed: {err}"
                )));
            }
        };

        let verification = match output.face_matches().first() {
            Some(face) => Verification {
                is_match: true,
                similarity: face.similarity().unwrap_or(self.threshold),
            },
            None => Verification::no_match(),
        };
        debug!("Rekognition verification for {voter_id}: {verification:?}");
        Ok(verification)
    }
}
