//! Two-step write across the attachment store and the record store.
//!
//! ```text
//! Idle ──write_attachment──▶ AttachmentWritten ──write_record ok──▶ RecordWritten ──commit──▶ Committed
//!                                   │
//!                                   └─ write_record err ─▶ delete attachment ─┬─ ok ──▶ Idle
//!                                                                             └─ err ─▶ CompensationPending
//! ```
//!
//! A superseded attachment (old avatar, old thumbnail) is only deleted at
//! commit, after the record points at the new one. If that delete fails the
//! file is orphaned, never referenced by a dangling record.

use std::future::Future;

use anyhow::anyhow;
use tracing::{error, info, warn};

use super::UploadItem;
use crate::{
    error::{ApiError, ApiResult},
    storage::StorageClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaState {
    Idle,
    AttachmentWritten(String),
    RecordWritten(String),
    Committed(String),
    /// Record write failed and the new attachment could not be removed.
    CompensationPending(String),
}

pub struct AttachmentSaga<'a> {
    storage: &'a dyn StorageClient,
    state: SagaState,
}

impl<'a> AttachmentSaga<'a> {
    pub fn new(storage: &'a dyn StorageClient) -> Self {
        Self {
            storage,
            state: SagaState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SagaState {
        &self.state
    }

    /// Store the upload under a freshly generated name and return that name.
    pub async fn write_attachment(&mut self, item: &UploadItem) -> ApiResult<String> {
        if self.state != SagaState::Idle {
            return Err(anyhow!("attachment write in state {:?}", self.state).into());
        }
        let name = item.generated_name();
        self.storage
            .put_object(&name, item.body.clone(), &item.content_type)
            .await
            .map_err(|e| {
                error!(error = %e, attachment = %name, "attachment write failed");
                ApiError::Storage(e.to_string())
            })?;
        self.state = SagaState::AttachmentWritten(name.clone());
        Ok(name)
    }

    /// Run the record mutation; on failure remove the attachment written just before.
    pub async fn write_record<T, F>(&mut self, record: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let SagaState::AttachmentWritten(name) = &self.state else {
            return Err(anyhow!("record write in state {:?}", self.state).into());
        };
        let name = name.clone();

        match record.await {
            Ok(value) => {
                self.state = SagaState::RecordWritten(name);
                Ok(value)
            }
            Err(e) => {
                self.compensate(name).await;
                Err(e)
            }
        }
    }

    async fn compensate(&mut self, name: String) {
        match self.storage.delete_object(&name).await {
            Ok(()) => {
                warn!(attachment = %name, "record write failed; new attachment removed");
                self.state = SagaState::Idle;
            }
            Err(e) => {
                error!(
                    error = %e,
                    attachment = %name,
                    "record write failed and attachment could not be removed; reconcile out of band"
                );
                self.state = SagaState::CompensationPending(name);
            }
        }
    }

    /// Finish the saga, then retire the attachment the record no longer points at.
    pub async fn commit(&mut self, superseded: Option<&str>) {
        match &self.state {
            SagaState::RecordWritten(name) => {
                self.state = SagaState::Committed(name.clone());
            }
            other => {
                error!(state = ?other, "commit outside RecordWritten");
                return;
            }
        }
        if let Some(old) = superseded {
            retire(self.storage, old).await;
        }
    }
}

/// Best-effort delete of an attachment nothing references any more.
pub async fn retire(storage: &dyn StorageClient, name: &str) {
    match storage.delete_object(name).await {
        Ok(()) => info!(attachment = %name, "superseded attachment removed"),
        Err(e) => warn!(error = %e, attachment = %name, "superseded attachment left orphaned"),
    }
}
