use async_trait::async_trait;

use super::RemoteClient;
use crate::repository::{ObjectStore, StorageError};

#[async_trait]
impl ObjectStore for RemoteClient {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.object_url(key))
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes);
        self.send(request).await?;
        tracing::debug!(key, "object uploaded");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{key}",
            self.base(),
            self.config.bucket
        )
    }
}
