//! S3-backed state document store

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rotation::{RotationState, StateStore, StateStoreError};

const CONTENT_TYPE: &str = "application/json";

/// Stores the rotation state as one JSON object in a bucket
#[derive(Debug, Clone)]
pub struct S3StateStore {
    client: Client,
    bucket: String,
    key: String,
}

impl S3StateStore {
    pub fn new(config: &SdkConfig, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    fn backend(&self, err: impl std::error::Error) -> StateStoreError {
        StateStoreError::Backend {
            location: self.location(),
            message: DisplayErrorContext(err).to_string(),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(self.backend(e));
            }
        };

        let body = output.body.collect().await.map_err(|e| self.backend(e))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn write(&self, key: &str, body: Vec<u8>) -> Result<(), StateStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| self.backend(e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StateStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.backend(e))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self) -> Result<RotationState, StateStoreError> {
        let Some(body) = self.read(&self.key).await? else {
            return Err(StateStoreError::NotFound {
                location: self.location(),
            });
        };

        let state: RotationState =
            serde_json::from_slice(&body).map_err(|e| StateStoreError::Corrupt {
                location: self.location(),
                message: e.to_string(),
            })?;

        info!(
            location = %self.location(),
            domains = %state.domains(),
            certificate_arn = ?state.certificate_id(),
            "Loaded rotation state"
        );
        Ok(state)
    }

    async fn save(&self, state: &RotationState) -> Result<(), StateStoreError> {
        let body = serde_json::to_vec(state).map_err(|e| StateStoreError::Corrupt {
            location: self.location(),
            message: e.to_string(),
        })?;
        self.write(&self.key, body).await?;

        debug!(location = %self.location(), "Saved rotation state");
        Ok(())
    }

    async fn probe(&self) -> Result<(), StateStoreError> {
        let probe_key = format!("{}.{}", self.key, Uuid::new_v4());
        let payload = b"ok".to_vec();

        self.write(&probe_key, payload.clone()).await?;
        let read_back = self.read(&probe_key).await;
        let removed = self.remove(&probe_key).await;

        match read_back? {
            Some(body) if body == payload => {}
            Some(_) => {
                return Err(StateStoreError::Backend {
                    location: format!("s3://{}/{}", self.bucket, probe_key),
                    message: "probe object read back with different content".to_string(),
                })
            }
            None => {
                return Err(StateStoreError::Backend {
                    location: format!("s3://{}/{}", self.bucket, probe_key),
                    message: "probe object missing after write".to_string(),
                })
            }
        }
        removed
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
