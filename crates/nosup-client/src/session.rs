//! Upload session state machine.
//!
//! One session per file. The lifecycle runs Waiting → Validating → (Hashing →
//! Authorizing →) Transferring and ends in exactly one of Completed, Failed,
//! or Aborted; terminal sessions accept nothing further. Retrying means
//! constructing a new session, which re-consults the resume store and picks
//! up at the server's acknowledged offset, so progress survives failures.
//!
//! Progress and the terminal outcome arrive on an event channel; exactly one
//! terminal event is emitted per session (Aborted counts as terminal, and
//! suppresses both Completed and Failed). The status is separately observable
//! through the handle's watch channel.

use crate::hasher::{self, HashOutcome};
use crate::sign::SigningClient;
use crate::transfer::{ChunkSpec, TransferClient};
use nosup_core::models::{AuthGrant, ContentDigest, FileDescriptor, ResumeRecord, UploadStatus};
use nosup_core::{UploadConfig, UploadError};
use nosup_store::ResumeStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Session notifications, in emission order: zero or more progress events,
/// then exactly one terminal event.
#[derive(Clone, Debug)]
pub enum UploadEvent {
    /// Content-hashing progress, fraction in (0, 1].
    HashProgress(f64),
    /// Transfer progress, fraction in (0, 1]. Monotone within a session.
    Progress(f64),
    Completed(UploadReceipt),
    Failed { code: u16, message: String },
    Aborted,
}

/// What a completed upload resolved to. The form path carries no
/// authorization, so its receipt holds only the size.
#[derive(Clone, Debug, Default)]
pub struct UploadReceipt {
    pub bucket: Option<String>,
    pub object: Option<String>,
    pub token: Option<String>,
    pub digest: Option<ContentDigest>,
    pub size: u64,
}

/// Caller-side handle for a spawned session.
pub struct UploadHandle {
    abort_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<UploadStatus>,
    join: tokio::task::JoinHandle<()>,
}

impl UploadHandle {
    /// Current session status.
    pub fn status(&self) -> UploadStatus {
        *self.status_rx.borrow()
    }

    /// A watcher over status transitions.
    pub fn status_watch(&self) -> watch::Receiver<UploadStatus> {
        self.status_rx.clone()
    }

    /// Cancel the session. Effective while hashing, authorizing, or
    /// transferring: the in-flight operation is dropped (a hash window in
    /// flight finishes first), the session emits `Aborted`, and no success or
    /// failure event follows. Resume state already persisted is left intact.
    /// Ignored once the session is terminal.
    pub async fn abort(&self) {
        let _ = self.abort_tx.send(()).await;
    }

    /// Wait for the session task to finish.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

pub struct UploadSession {
    config: UploadConfig,
    path: PathBuf,
    store: Arc<dyn ResumeStore>,
    events: mpsc::UnboundedSender<UploadEvent>,
    status_tx: watch::Sender<UploadStatus>,
    abort_rx: mpsc::Receiver<()>,
    digest: Option<ContentDigest>,
    bytes_acknowledged: u64,
}

/// Internal terminal outcome; `run` turns this into the status and event.
enum Flow {
    Completed(UploadReceipt),
    Failed(UploadError),
    Aborted,
}

impl UploadSession {
    /// Spawn a session for `path` and return its handle and event stream.
    ///
    /// The task starts immediately. The event channel is unbounded and closes
    /// after the terminal event, so draining it to completion observes the
    /// whole session.
    pub fn spawn(
        path: impl Into<PathBuf>,
        config: UploadConfig,
        store: Arc<dyn ResumeStore>,
    ) -> (UploadHandle, mpsc::UnboundedReceiver<UploadEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(UploadStatus::Waiting);
        let (abort_tx, abort_rx) = mpsc::channel(1);

        let session = UploadSession {
            config,
            path: path.into(),
            store,
            events: events_tx,
            status_tx,
            abort_rx,
            digest: None,
            bytes_acknowledged: 0,
        };
        let join = tokio::spawn(session.run());

        (
            UploadHandle {
                abort_tx,
                status_rx,
                join,
            },
            events_rx,
        )
    }

    async fn run(mut self) {
        let flow = match self.drive().await {
            Ok(Some(receipt)) => Flow::Completed(receipt),
            Ok(None) => Flow::Aborted,
            Err(error) => Flow::Failed(error),
        };
        match flow {
            Flow::Completed(receipt) => {
                self.set_status(UploadStatus::Completed);
                tracing::info!(
                    object = receipt.object.as_deref().unwrap_or(""),
                    size = receipt.size,
                    "Upload completed"
                );
                let _ = self.events.send(UploadEvent::Completed(receipt));
            }
            Flow::Failed(error) => {
                self.set_status(UploadStatus::Failed);
                tracing::warn!(code = error.error_code(), error = %error, "Upload failed");
                let _ = self.events.send(UploadEvent::Failed {
                    code: error.error_code(),
                    message: error.client_message(),
                });
            }
            Flow::Aborted => {
                self.set_status(UploadStatus::Aborted);
                tracing::info!("Upload aborted by caller");
                let _ = self.events.send(UploadEvent::Aborted);
            }
        }
    }

    /// `Ok(Some(receipt))` on success, `Ok(None)` on abort.
    async fn drive(&mut self) -> Result<Option<UploadReceipt>, UploadError> {
        self.set_status(UploadStatus::Validating);
        let descriptor = self.validate().await?;
        tracing::info!(file = %descriptor.name, size = descriptor.size, "Upload session started");

        if let Some(fields) = self.config.form_params.clone() {
            return self.run_form(&descriptor, fields).await;
        }
        self.run_chunked(&descriptor).await
    }

    /// Pure pre-flight checks, in order: existence, size limit, extension.
    /// No network side effects.
    async fn validate(&self) -> Result<FileDescriptor, UploadError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(UploadError::FileMissing),
        };
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or(UploadError::FileMissing)?;
        let descriptor = FileDescriptor {
            path: self.path.clone(),
            name,
            size: metadata.len(),
            content_type: None,
        };

        if descriptor.size > self.config.limit_size {
            return Err(UploadError::SizeExceeded {
                size: descriptor.size,
                limit: self.config.limit_size,
            });
        }
        match descriptor.extension() {
            // A name without an extension is rejected regardless of the
            // whitelist.
            None => return Err(UploadError::ExtensionRejected(descriptor.name.clone())),
            Some(ext) if !self.config.allowed_extensions.allows(ext) => {
                return Err(UploadError::ExtensionRejected(ext.to_string()))
            }
            Some(_) => {}
        }
        Ok(descriptor)
    }

    /// Single pre-signed multipart submission; no hashing, authorization, or
    /// resume state.
    async fn run_form(
        &mut self,
        descriptor: &FileDescriptor,
        fields: HashMap<String, String>,
    ) -> Result<Option<UploadReceipt>, UploadError> {
        self.set_status(UploadStatus::Transferring);
        let transfer = TransferClient::new(&self.config.host)?;
        let progress = self.progress_reporter(0, descriptor.size);

        let upload =
            transfer.upload_form(&fields, &descriptor.path, &descriptor.name, descriptor.size, progress);
        tokio::select! {
            Some(()) = self.abort_rx.recv() => return Ok(None),
            result = upload => result?,
        }

        self.bytes_acknowledged = descriptor.size;
        let _ = self.events.send(UploadEvent::Progress(1.0));
        Ok(Some(UploadReceipt {
            size: descriptor.size,
            ..Default::default()
        }))
    }

    async fn run_chunked(
        &mut self,
        descriptor: &FileDescriptor,
    ) -> Result<Option<UploadReceipt>, UploadError> {
        self.set_status(UploadStatus::Hashing);
        let digest = match self.hash_file(descriptor).await? {
            Some(digest) => digest,
            None => return Ok(None),
        };

        let hint = match self.store.lookup(&digest).await {
            Ok(hint) => hint,
            Err(error) => {
                tracing::warn!(error = %error, "Resume store lookup failed; starting fresh");
                None
            }
        };

        self.set_status(UploadStatus::Authorizing);
        let signer = SigningClient::new(&self.config.sign_url, &self.config.upload_type)?;
        let authorize = signer.authorize(descriptor, hint.as_ref());
        let grant = tokio::select! {
            Some(()) = self.abort_rx.recv() => return Ok(None),
            result = authorize => result?,
        };

        if grant.direct_upload {
            // Content-addressed short-circuit: the server already has these
            // bytes under the granted object.
            self.clear_record(&digest).await;
            self.bytes_acknowledged = descriptor.size;
            let _ = self.events.send(UploadEvent::Progress(1.0));
            let object = grant.object.clone();
            return Ok(Some(self.receipt(descriptor, &grant, object)));
        }

        let transfer = TransferClient::new(&self.config.host)?;
        let (object_name, mut context, start_offset) = match hint {
            Some(hint) => {
                let probe =
                    transfer.query_offset(&grant.bucket, &hint.object_name, &hint.context, &grant.token);
                let offset = tokio::select! {
                    Some(()) = self.abort_rx.recv() => return Ok(None),
                    result = probe => result?,
                };
                if offset == 0 {
                    // The server kept nothing for this context; the local
                    // record is stale. Start fresh under the granted object.
                    self.clear_record(&digest).await;
                    (grant.object.clone(), None, 0)
                } else {
                    tracing::info!(
                        offset,
                        object = %hint.object_name,
                        "Resuming at server-acknowledged offset"
                    );
                    (hint.object_name, Some(hint.context), offset)
                }
            }
            None => (grant.object.clone(), None, 0),
        };

        self.set_status(UploadStatus::Transferring);
        self.bytes_acknowledged = start_offset.min(descriptor.size);
        let size = descriptor.size;
        let mut offset = start_offset;
        loop {
            let end = (offset.saturating_add(self.config.chunk_size)).min(size).max(offset);
            let spec = ChunkSpec {
                bucket: &grant.bucket,
                object: &object_name,
                token: &grant.token,
                offset,
                length: end - offset,
                complete: end >= size,
                context: context.as_deref(),
            };
            let progress = self.progress_reporter(self.bytes_acknowledged, size);
            let upload = transfer.upload_chunk(&descriptor.path, spec, progress);
            let ack = tokio::select! {
                Some(()) = self.abort_rx.recv() => return Ok(None),
                result = upload => result?,
            };

            // The server's offset is authoritative, even when it does not
            // equal the requested chunk end.
            self.bytes_acknowledged = self.bytes_acknowledged.max(ack.offset.min(size));
            tracing::debug!(acked = ack.offset, size, "Chunk acknowledged");

            if ack.offset >= size {
                self.clear_record(&digest).await;
                let _ = self.events.send(UploadEvent::Progress(1.0));
                return Ok(Some(self.receipt(descriptor, &grant, object_name)));
            }

            if let Some(new_context) = ack.context {
                self.save_record(&digest, &new_context, &object_name).await;
                context = Some(new_context);
            }
            offset = ack.offset;
        }
    }

    /// Compute (or reuse) the session's content digest, forwarding window
    /// progress to the event channel. `Ok(None)` when aborted mid-hash.
    async fn hash_file(
        &mut self,
        descriptor: &FileDescriptor,
    ) -> Result<Option<ContentDigest>, UploadError> {
        if let Some(digest) = &self.digest {
            return Ok(Some(digest.clone()));
        }
        let events = self.events.clone();
        let abort_rx = &mut self.abort_rx;
        let outcome = hasher::compute_digest(
            &descriptor.path,
            self.config.hash_window_size,
            |fraction| {
                let _ = events.send(UploadEvent::HashProgress(fraction));
            },
            || abort_rx.try_recv().is_ok(),
        )
        .await?;
        match outcome {
            HashOutcome::Complete(digest) => {
                self.digest = Some(digest.clone());
                Ok(Some(digest))
            }
            HashOutcome::Aborted => Ok(None),
        }
    }

    /// Progress callback for one request: reports
    /// `(offset_before + bytes_sent) / size`, clamped into (0, 1].
    fn progress_reporter(&self, base: u64, size: u64) -> impl FnMut(u64) + Send + 'static {
        let events = self.events.clone();
        move |sent: u64| {
            if size == 0 {
                return;
            }
            let fraction = ((base + sent) as f64 / size as f64).clamp(0.0, 1.0);
            if fraction > 0.0 {
                let _ = events.send(UploadEvent::Progress(fraction));
            }
        }
    }

    fn receipt(&self, descriptor: &FileDescriptor, grant: &AuthGrant, object: String) -> UploadReceipt {
        UploadReceipt {
            bucket: Some(grant.bucket.clone()),
            object: Some(object),
            token: Some(grant.token.clone()),
            digest: self.digest.clone(),
            size: descriptor.size,
        }
    }

    async fn save_record(&self, digest: &ContentDigest, context: &str, object_name: &str) {
        let record = ResumeRecord {
            context: context.to_string(),
            object_name: object_name.to_string(),
        };
        // Resume state is an optimization; a store failure must not kill a
        // healthy transfer.
        if let Err(error) = self.store.save(digest, record).await {
            tracing::warn!(error = %error, digest = %digest, "Failed to persist resume record");
        }
    }

    async fn clear_record(&self, digest: &ContentDigest) {
        if let Err(error) = self.store.clear(digest).await {
            tracing::warn!(error = %error, digest = %digest, "Failed to clear resume record");
        }
    }

    fn set_status(&self, status: UploadStatus) {
        let _ = self.status_tx.send(status);
    }
}
