use tracing::info;

use crate::{LinkProcessor, LinkRequest, NormalizedLink, ProcessError, ProcessOptions};

/// Application service: runs the pipeline and persists the result.
///
/// The pipeline's key and external-id checks race with concurrent writers;
/// the store's unique constraints are the real guard, and their violations
/// come back as `Conflict` rejections through `From<StoreError>`.
pub struct LinkService {
    processor: LinkProcessor,
}

impl LinkService {
    pub fn new(processor: LinkProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &LinkProcessor {
        &self.processor
    }

    /// Validate and store a new link.
    pub async fn create(
        &self,
        payload: LinkRequest,
        opts: &ProcessOptions,
    ) -> Result<NormalizedLink, ProcessError> {
        let link = self.processor.process(payload, opts).await?;
        self.processor
            .collaborators()
            .store
            .insert_link(&link)
            .await?;
        info!(domain = %link.domain, key = %link.key, "link created");
        Ok(link)
    }

    /// Validate an edit of `existing` and store it. Checks for values that
    /// did not change are skipped.
    pub async fn update(
        &self,
        existing: &NormalizedLink,
        mut payload: LinkRequest,
        opts: &ProcessOptions,
    ) -> Result<NormalizedLink, ProcessError> {
        if payload.domain.is_none() {
            payload.domain = Some(existing.domain.clone());
        }
        if payload.key.is_none() {
            payload.key = Some(existing.key.clone());
        }
        if payload.user_id.is_none() {
            payload.user_id = existing.user_id.clone();
        }

        let mut opts = opts.clone();
        opts.skip_key_checks |= payload.domain.as_deref() == Some(existing.domain.as_str())
            && payload.key.as_deref() == Some(existing.key.as_str());
        opts.skip_external_id_checks |= payload.external_id == existing.external_id;
        opts.skip_folder_checks |= payload.folder_id == existing.folder_id;

        let link = self.processor.process(payload, &opts).await?;
        self.processor
            .collaborators()
            .store
            .replace_link(&existing.domain, &existing.key, &link)
            .await?;
        info!(domain = %link.domain, key = %link.key, "link updated");
        Ok(link)
    }
}
