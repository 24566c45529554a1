use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::analyzers::types::AggregateRow;
use crate::config::Period;
use crate::error::{PipelineError, Result};
use crate::output::{encode_artifact, verify_artifact};
use crate::services::publisher::{ArtifactPublisher, PublishReceipt};

/// Publishes artifacts as S3 objects.
///
/// A single `PutObject` replaces the previous object atomically, so no
/// staging step is needed: readers get the old object or the new one.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Builds a client from the ambient AWS configuration.
    pub async fn from_env(bucket: &str, prefix: &str) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, prefix)
    }

    pub fn object_key(&self, period: Period) -> String {
        object_key(&self.prefix, period)
    }
}

fn object_key(prefix: &str, period: Period) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        period.artifact_file_name()
    } else {
        format!("{}/{}", prefix, period.artifact_file_name())
    }
}

#[async_trait::async_trait]
impl ArtifactPublisher for S3ArtifactStore {
    #[tracing::instrument(skip(self, rows), fields(bucket = %self.bucket, rows = rows.len()))]
    async fn publish(&self, period: Period, rows: &[AggregateRow]) -> Result<PublishReceipt> {
        let key = self.object_key(period);
        let location = format!("s3://{}/{}", self.bucket, key);

        let body = encode_artifact(rows).map_err(|e| PipelineError::publish(&location, e))?;
        verify_artifact(&body, rows.len()).map_err(|e| PipelineError::publish(&location, e))?;
        let bytes = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| PipelineError::publish(&location, e))?;

        info!(location = %location, bytes, "Artifact uploaded");
        Ok(PublishReceipt {
            location,
            bytes,
            rows: rows.len(),
        })
    }
}
