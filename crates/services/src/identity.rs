use std::sync::Arc;

use storage::repository::{SecureStore, StorageError};
use study_core::model::AnonymousId;
use tokio::sync::OnceCell;

/// Secure-store key for the per-device anonymous identifier.
pub const ANONYMOUS_ID_KEY: &str = "anonymous_user_id";

/// Resolves the anonymous id that tags all progress rows from this device.
pub struct IdentityService {
    secure: Arc<dyn SecureStore>,
    cached: OnceCell<AnonymousId>,
}

impl IdentityService {
    #[must_use]
    pub fn new(secure: Arc<dyn SecureStore>) -> Self {
        Self {
            secure,
            cached: OnceCell::new(),
        }
    }

    /// The device's anonymous id, created and persisted on first use.
    ///
    /// If the secure store cannot be used, a fresh id is returned without
    /// being persisted or cached, so progress still records.
    pub async fn anonymous_id(&self) -> AnonymousId {
        match self.cached.get_or_try_init(|| self.load_or_create()).await {
            Ok(id) => id.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "secure store unavailable; using ephemeral anonymous id");
                AnonymousId::generate()
            }
        }
    }

    async fn load_or_create(&self) -> Result<AnonymousId, StorageError> {
        if let Some(raw) = self.secure.get_secret(ANONYMOUS_ID_KEY).await? {
            if !raw.trim().is_empty() {
                return Ok(AnonymousId::new(raw));
            }
        }
        let id = AnonymousId::generate();
        self.secure
            .set_secret(ANONYMOUS_ID_KEY, id.as_str())
            .await?;
        tracing::info!("created anonymous id for this device");
        Ok(id)
    }
}
