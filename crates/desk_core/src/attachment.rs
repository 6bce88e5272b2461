//! Attachment-upload collaborator for the message composer: uploads file
//! bytes to the host endpoint and hands the created record to whichever
//! component asked for it through a single-shot channel.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

static NEXT_TEMPORARY_ID: AtomicU64 = AtomicU64::new(0);

/// Placeholder id for the attachment row shown while its upload is in
/// flight. Process-wide and monotonically increasing, starting at 1.
pub fn next_temporary_id() -> u64 {
    NEXT_TEMPORARY_ID.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub attachment_id: i64,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    attachment_id: i64,
    size_bytes: u64,
}

/// Fired by the owning component to abandon an in-flight upload.
pub type CancelUpload = oneshot::Receiver<()>;

pub fn cancel_pair() -> (oneshot::Sender<()>, CancelUpload) {
    oneshot::channel()
}

pub struct AttachmentUploader {
    http: Client,
    upload_url: String,
}

impl AttachmentUploader {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            upload_url: upload_url.into(),
        }
    }

    /// Uploads the file, resolving to `Ok(None)` when the cancellation fires
    /// first. Cancellation is expected and silent; every other transport
    /// failure propagates. Dropping the cancel sender without firing it
    /// leaves the upload running.
    pub async fn upload(
        &self,
        upload: AttachmentUpload,
        mut cancel: CancelUpload,
    ) -> Result<Option<AttachmentRecord>> {
        let request = self
            .http
            .post(&self.upload_url)
            .query(&[
                ("filename", upload.filename.clone()),
                (
                    "mime_type",
                    upload
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                ),
            ])
            .body(upload.bytes);

        tokio::select! {
            biased;
            Ok(()) = &mut cancel => {
                debug!(filename = %upload.filename, "attachment upload cancelled");
                Ok(None)
            }
            response = async {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<UploadResponse>()
                    .await
            } => {
                let response = response.context("attachment upload failed")?;
                Ok(Some(AttachmentRecord {
                    attachment_id: response.attachment_id,
                    filename: upload.filename,
                    mime_type: upload.mime_type,
                    size_bytes: response.size_bytes,
                }))
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("attachment handoff cancelled before completion")]
pub struct HandoffCancelled;

pub struct AttachmentHandoffSender {
    sender: oneshot::Sender<AttachmentRecord>,
}

/// Waiting side of the handoff; resolves once the uploader completes or the
/// sender is dropped on component teardown.
pub struct AttachmentHandoff {
    receiver: oneshot::Receiver<AttachmentRecord>,
}

/// Single-shot handoff of the created attachment from the uploader to the
/// component that requested the upload.
pub fn attachment_handoff() -> (AttachmentHandoffSender, AttachmentHandoff) {
    let (sender, receiver) = oneshot::channel();
    (
        AttachmentHandoffSender { sender },
        AttachmentHandoff { receiver },
    )
}

impl AttachmentHandoffSender {
    /// Completes the handoff. A receiver that already went away is fine; the
    /// record is dropped.
    pub fn complete(self, record: AttachmentRecord) {
        let _ = self.sender.send(record);
    }
}

impl AttachmentHandoff {
    pub async fn wait(self) -> Result<AttachmentRecord, HandoffCancelled> {
        self.receiver.await.map_err(|_| HandoffCancelled)
    }
}
