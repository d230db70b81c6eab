use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use super::errors::TransportError;
use super::transport::{ProgressSink, Uploader};
use super::types::{FileDescriptor, TaskId, TransportEvent, UploadPolicy};

pub struct UploadWorker<U> {
    pub(crate) uploader: Arc<U>,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) events: mpsc::UnboundedSender<TransportEvent>,
}

impl<U: Uploader> UploadWorker<U> {
    pub async fn run(self, id: TaskId, descriptor: FileDescriptor, policy: Arc<UploadPolicy>) {
        let progress = ProgressSink::new(id, descriptor.size, self.events.clone());
        let future = self.uploader.upload(&descriptor, &policy, progress);

        // 执行
        let result = tokio::select! {
            result = future => result,
            _ = self.cancellation_token.cancelled() => Err(TransportError::Cancelled),
        };

        let event = match result {
            Ok(result) => TransportEvent::Completed { id, result },
            Err(TransportError::Cancelled) => {
                // aborted uploads stay silent
                debug!(task = %id, "upload aborted");
                return;
            }
            Err(error) => {
                warn!(task = %id, %error, "upload failed");
                TransportEvent::Failed { id, error }
            }
        };

        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use async_trait::async_trait;
    use url::Url;
    use crate::upload::types::UploadResult;

    struct SlowUploader;

    #[async_trait]
    impl Uploader for SlowUploader {
        async fn upload(
            &self,
            _descriptor: &FileDescriptor,
            _policy: &UploadPolicy,
            progress: ProgressSink,
        ) -> Result<UploadResult, TransportError> {
            progress.report(1);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(UploadResult {
                id: "late".to_string(),
                name: String::new(),
                size: 0,
                content_type: String::new(),
                creation_date: None,
            })
        }
    }

    struct BrokenUploader;

    #[async_trait]
    impl Uploader for BrokenUploader {
        async fn upload(
            &self,
            _descriptor: &FileDescriptor,
            _policy: &UploadPolicy,
            _progress: ProgressSink,
        ) -> Result<UploadResult, TransportError> {
            Err(TransportError::server_error(500, "boom"))
        }
    }

    fn policy() -> Arc<UploadPolicy> {
        Arc::new(UploadPolicy::new(1, Url::parse("http://localhost/files").unwrap()))
    }

    #[tokio::test]
    async fn test_cancelled_worker_sends_no_terminal_event() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let worker = UploadWorker {
            uploader: Arc::new(SlowUploader),
            cancellation_token: token.clone(),
            events,
        };

        let id = TaskId::from_raw(7);
        let handle = tokio::spawn(worker.run(id, FileDescriptor::new("a", 10, "text/plain"), policy()));

        match events_rx.recv().await.unwrap() {
            TransportEvent::Progress { loaded, total, .. } => {
                assert_eq!((loaded, total), (1, 10));
            }
            other => panic!("unexpected event {:?}", other),
        }

        token.cancel();
        handle.await.unwrap();
        assert!(events_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_worker_reports_error() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let worker = UploadWorker {
            uploader: Arc::new(BrokenUploader),
            cancellation_token: CancellationToken::new(),
            events,
        };

        worker.run(TaskId::from_raw(1), FileDescriptor::new("a", 10, "text/plain"), policy()).await;

        match events_rx.recv().await.unwrap() {
            TransportEvent::Failed { id, error } => {
                assert_eq!(id, TaskId::from_raw(1));
                assert_eq!(error, TransportError::server_error(500, "boom"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
