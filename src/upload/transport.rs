use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use super::errors::TransportError;
use super::types::{FileDescriptor, TaskId, TransportEvent, UploadPolicy, UploadResult};
use super::worker::UploadWorker;

/// Capability to abort one in-flight transfer.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Moves the bytes of one task somewhere.
///
/// `begin_upload` must return without waiting for the transfer. Progress and
/// exactly one terminal event are delivered later as [`TransportEvent`]s, except
/// after the returned handle was aborted, where the transport may stay silent.
pub trait TransportAdapter: Send {
    fn begin_upload(
        &self,
        id: TaskId,
        descriptor: &FileDescriptor,
        policy: &Arc<UploadPolicy>,
    ) -> Result<CancelHandle, TransportError>;
}

/// Performs a single upload to completion.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        descriptor: &FileDescriptor,
        policy: &UploadPolicy,
        progress: ProgressSink,
    ) -> Result<UploadResult, TransportError>;
}

/// Forwards cumulative byte counts of one upload as progress events.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    id: TaskId,
    total: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ProgressSink {
    pub fn new(id: TaskId, total: u64, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { id, total, events }
    }

    pub fn report(&self, loaded: u64) {
        let _ = self.events.send(TransportEvent::Progress {
            id: self.id,
            loaded: loaded.min(self.total),
            total: self.total,
        });
    }
}

/// [`TransportAdapter`] running every upload as its own tokio task.
pub struct SpawningTransport<U> {
    uploader: Arc<U>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl<U> SpawningTransport<U>
where
    U: Uploader + 'static,
{
    /// Returns the transport and the receiving end of its event channel.
    pub fn new(uploader: U) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            uploader: Arc::new(uploader),
            events,
        };

        (transport, events_rx)
    }
}

impl<U> TransportAdapter for SpawningTransport<U>
where
    U: Uploader + 'static,
{
    fn begin_upload(
        &self,
        id: TaskId,
        descriptor: &FileDescriptor,
        policy: &Arc<UploadPolicy>,
    ) -> Result<CancelHandle, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;

        let cancellation_token = CancellationToken::new();
        let worker = UploadWorker {
            uploader: self.uploader.clone(),
            cancellation_token: cancellation_token.clone(),
            events: self.events.clone(),
        };

        runtime.spawn(worker.run(id, descriptor.clone(), policy.clone()));
        debug!(task = %id, file = %descriptor.name, "upload spawned");

        Ok(CancelHandle::new(cancellation_token))
    }
}
