use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use super::errors::{Result, UploadError};
use super::manager::UploadQueue;
use super::service_worker::UploadServiceWorker;
use super::transport::{SpawningTransport, Uploader};
use super::types::{FileDescriptor, ServiceCommand, TaskId, TaskSnapshot, TransportEvent, UploadEvent, UploadPolicy};
use super::validator::ErrorLog;

/// Async front of one [`UploadQueue`].
///
/// The queue lives inside a single worker task which applies commands and
/// transport events one at a time.
#[derive(Clone)]
pub struct UploadService {
    command_tx: mpsc::Sender<ServiceCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// 上传服务句柄 - 包含服务和工作线程
pub struct UploadServiceHandle {
    pub service: UploadService,
    pub worker_handle: JoinHandle<()>,
}

impl UploadServiceHandle {
    /// Cancel everything still uploading and wait for the worker to exit.
    ///
    /// Clones of the service keep the worker alive until they are dropped too.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.service);
        self.worker_handle.await
            .map_err(|err| UploadError::InternalError(format!("Worker panic: {}", err)))
    }
}

impl UploadService {
    pub fn new(
        queue: UploadQueue,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        event_capacity: usize,
    ) -> UploadServiceHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));

        let worker_handle = tokio::spawn(UploadServiceWorker::run(
            queue,
            command_rx,
            transport_rx,
            event_tx.clone(),
        ));

        let service = Self {
            command_tx,
            event_tx,
        };

        UploadServiceHandle {
            service,
            worker_handle,
        }
    }

    /// Start a service whose uploads each run on their own tokio task.
    pub fn spawn<U>(policy: UploadPolicy, uploader: U, errors: ErrorLog, event_capacity: usize) -> UploadServiceHandle
    where
        U: Uploader + 'static,
    {
        let (transport, transport_rx) = SpawningTransport::new(uploader);
        let queue = UploadQueue::new(policy, transport, errors);
        Self::new(queue, transport_rx, event_capacity)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ServiceCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| UploadError::internal_error("Service shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))
    }

    /// Submit files, returns the ids of the tasks that were created
    pub async fn submit(&self, descriptors: Vec<FileDescriptor>) -> Result<Vec<TaskId>> {
        self.request(|reply| ServiceCommand::Submit { descriptors, reply }).await
    }

    /// Cancel upload
    pub async fn cancel_upload(&self, id: TaskId) -> Result<()> {
        self.request(|reply| ServiceCommand::CancelUpload { id, reply }).await?
    }

    /// Cancel all uploads, returns how many were discarded
    pub async fn cancel_all(&self) -> Result<usize> {
        self.request(|reply| ServiceCommand::CancelAll { reply }).await
    }

    /// Get task
    pub async fn get_task(&self, id: TaskId) -> Result<Option<TaskSnapshot>> {
        self.request(|reply| ServiceCommand::GetTask { id, reply }).await
    }

    pub async fn uploading(&self) -> Result<Vec<TaskSnapshot>> {
        self.request(|reply| ServiceCommand::GetUploading { reply }).await
    }

    pub async fn uploaded(&self) -> Result<Vec<TaskSnapshot>> {
        self.request(|reply| ServiceCommand::GetUploaded { reply }).await
    }

    pub async fn uploaded_file_ids(&self) -> Result<Vec<String>> {
        self.request(|reply| ServiceCommand::UploadedFileIds { reply }).await
    }

    pub async fn overall_progress(&self) -> Result<u8> {
        self.request(|reply| ServiceCommand::OverallProgress { reply }).await
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F> {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter
        }
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
