use chrono::{DateTime, Utc};
use super::errors::TransportError;
use super::progress::percent;
use super::transport::CancelHandle;
use super::types::{FileDescriptor, TaskId, TaskSnapshot, UploadResult, UploadState};

/// One file's upload attempt.
///
/// The cancel handle exists exactly while the task is `Uploading`; once a
/// terminal state is reached every mutator is a no-op.
#[derive(Debug)]
pub struct UploadTask {
    id: TaskId,
    descriptor: FileDescriptor,
    state: UploadState,
    bytes_transferred: u64,
    bytes_total: u64,
    cancel_handle: Option<CancelHandle>,
    error: Option<TransportError>,
    result: Option<UploadResult>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl UploadTask {
    pub fn new(id: TaskId, descriptor: FileDescriptor) -> Self {
        Self {
            id,
            bytes_total: descriptor.size,
            descriptor,
            state: UploadState::Queued,
            bytes_transferred: 0,
            cancel_handle: None,
            error: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_valid_transition(from: UploadState, to: UploadState) -> bool {
        use UploadState::*;

        matches!(
            (from, to),
            (Queued, Uploading)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Uploading, Cancelled)
        )
    }

    fn transition(&mut self, to: UploadState) -> bool {
        if !Self::is_valid_transition(self.state, to) {
            return false;
        }

        self.state = to;
        match to {
            UploadState::Uploading => self.started_at = Some(Utc::now()),
            _ if to.is_terminal() => {
                self.cancel_handle = None;
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        true
    }

    /// Transport accepted the task.
    pub(crate) fn begin(&mut self, handle: CancelHandle) -> bool {
        if self.state != UploadState::Queued {
            return false;
        }

        self.cancel_handle = Some(handle);
        self.transition(UploadState::Uploading)
    }

    /// Apply a progress report. Counts that would move backwards are dropped.
    pub(crate) fn apply_progress(&mut self, loaded: u64, total: u64) -> bool {
        if self.state != UploadState::Uploading {
            return false;
        }

        let total = total.max(self.bytes_transferred);
        let loaded = loaded.min(total);
        if loaded < self.bytes_transferred {
            return false;
        }

        self.bytes_total = total;
        self.bytes_transferred = loaded;
        true
    }

    pub(crate) fn complete(&mut self, result: UploadResult) -> bool {
        if !self.transition(UploadState::Completed) {
            return false;
        }

        self.bytes_transferred = self.bytes_total;
        self.result = Some(result);
        true
    }

    pub(crate) fn fail(&mut self, error: TransportError) -> bool {
        if !self.transition(UploadState::Failed) {
            return false;
        }

        self.error = Some(error);
        true
    }

    /// Abort the in-flight transfer, if any, and mark the task cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        if let Some(handle) = &self.cancel_handle {
            handle.abort();
        }

        self.transition(UploadState::Cancelled)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn has_cancel_handle(&self) -> bool {
        self.cancel_handle.is_some()
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn result(&self) -> Option<&UploadResult> {
        self.result.as_ref()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.descriptor.name.clone(),
            content_type: self.descriptor.content_type.clone(),
            state: self.state,
            bytes_transferred: self.bytes_transferred,
            bytes_total: self.bytes_total,
            percent: percent(self.bytes_transferred, self.bytes_total),
            error: self.error.as_ref().map(ToString::to_string),
            result: self.result.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn uploading_task(size: u64) -> (UploadTask, CancellationToken) {
        let token = CancellationToken::new();
        let mut task = UploadTask::new(TaskId::from_raw(1), FileDescriptor::new("doc.pdf", size, "application/pdf"));
        assert!(task.begin(CancelHandle::new(token.clone())));
        (task, token)
    }

    fn result() -> UploadResult {
        UploadResult {
            id: "stored-1".to_string(),
            name: "doc.pdf".to_string(),
            size: 100,
            content_type: "application/pdf".to_string(),
            creation_date: None,
        }
    }

    #[test]
    fn test_upload_state_transition() {
        use UploadState::*;

        // valid
        assert!(UploadTask::is_valid_transition(Queued, Uploading));
        assert!(UploadTask::is_valid_transition(Uploading, Completed));
        assert!(UploadTask::is_valid_transition(Uploading, Failed));
        assert!(UploadTask::is_valid_transition(Uploading, Cancelled));

        // invalid
        assert!(!UploadTask::is_valid_transition(Completed, Uploading));
        assert!(!UploadTask::is_valid_transition(Completed, Failed));
        assert!(!UploadTask::is_valid_transition(Failed, Completed));
        assert!(!UploadTask::is_valid_transition(Cancelled, Failed));
        assert!(!UploadTask::is_valid_transition(Queued, Completed));
    }

    #[test]
    fn test_new_task_is_queued_without_handle() {
        let task = UploadTask::new(TaskId::from_raw(3), FileDescriptor::new("a", 10, "text/plain"));
        assert_eq!(task.state(), UploadState::Queued);
        assert!(!task.has_cancel_handle());
        assert_eq!(task.bytes_total(), 10);
        assert_eq!(task.bytes_transferred(), 0);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let (mut task, _token) = uploading_task(100);

        assert!(task.apply_progress(10, 100));
        assert!(task.apply_progress(40, 100));
        assert!(!task.apply_progress(20, 100));
        assert_eq!(task.bytes_transferred(), 40);

        // duplicate report is harmless
        assert!(task.apply_progress(40, 100));
        assert!(task.apply_progress(250, 100));
        assert_eq!(task.bytes_transferred(), 100);
    }

    #[test]
    fn test_progress_ignored_while_queued() {
        let mut task = UploadTask::new(TaskId::from_raw(1), FileDescriptor::new("a", 10, "text/plain"));
        assert!(!task.apply_progress(5, 10));
        assert_eq!(task.bytes_transferred(), 0);
    }

    #[test]
    fn test_complete_clears_handle() {
        let (mut task, _token) = uploading_task(100);
        task.apply_progress(100, 100);

        assert!(task.complete(result()));
        assert_eq!(task.state(), UploadState::Completed);
        assert!(!task.has_cancel_handle());
        assert_eq!(task.result().unwrap().id, "stored-1");
        assert!(task.snapshot().completed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_write_once() {
        let (mut task, _token) = uploading_task(100);
        assert!(task.complete(result()));

        assert!(!task.fail(TransportError::server_error(500, "late")));
        assert!(!task.cancel());
        assert!(!task.apply_progress(1, 100));
        assert_eq!(task.state(), UploadState::Completed);
        assert!(task.error().is_none());
    }

    #[test]
    fn test_cancel_aborts_token() {
        let (mut task, token) = uploading_task(100);
        assert!(task.cancel());
        assert!(token.is_cancelled());
        assert_eq!(task.state(), UploadState::Cancelled);
        assert!(!task.has_cancel_handle());
    }

    #[test]
    fn test_fail_records_error() {
        let (mut task, token) = uploading_task(100);
        assert!(task.fail(TransportError::Http("connection reset".to_string())));
        assert_eq!(task.state(), UploadState::Failed);
        assert!(!token.is_cancelled());
        assert_eq!(task.snapshot().error.as_deref(), Some("HTTP Request error: connection reset"));
    }
}
