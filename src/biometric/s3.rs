use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use log::debug;

use crate::error::{Error, Result};

use super::ObjectStore;

/// Enrollment images kept in an S3 bucket.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[rocket::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn store(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| Error::TransientStore(format!("S3 upload of {key} failed: {e}")))?;
        debug!("Stored {size} bytes at s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(Error::TransientStore(format!(
                    "S3 download of {key} failed: {err}"
                )));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Error::TransientStore(format!("S3 download of {key} failed: {e}")))?
            .into_bytes();
        Ok(Some(bytes.to_vec()))
    }
}
