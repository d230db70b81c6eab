use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use super::errors::{Result, TransportError, UploadError};
use super::progress::{overall_percent, percent_for};
use super::task::UploadTask;
use super::transport::TransportAdapter;
use super::types::{FileDescriptor, TaskId, UploadPolicy, UploadResult, UploadState};
use super::validator::{validate, ErrorLog, ValidationError, ValidationResult};

/// Tasks keyed by id, iterated in insertion order.
#[derive(Debug, Default)]
struct TaskList {
    tasks: HashMap<TaskId, UploadTask>,
    order: Vec<TaskId>,
}

impl TaskList {
    fn insert(&mut self, task: UploadTask) {
        let id = task.id();
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: TaskId) -> Option<UploadTask> {
        let task = self.tasks.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(task)
    }

    fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.get(&id)
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut UploadTask> {
        self.tasks.get_mut(&id)
    }

    fn iter(&self) -> impl Iterator<Item = &UploadTask> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    fn drain(&mut self) -> Vec<UploadTask> {
        let mut tasks = std::mem::take(&mut self.tasks);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| tasks.remove(&id))
            .collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// What became of one `submit_batch` call.
#[derive(Debug, Default)]
pub struct SubmitOutcome {
    /// Every task created, in submission order.
    pub accepted: Vec<TaskId>,
    /// Descriptors refused by the validator. Already appended to the error log.
    pub rejected: Vec<ValidationError>,
    /// Tasks the transport refused to start. They are no longer in the queue.
    pub failed: Vec<UploadTask>,
}

/// Upload queue of one upload widget.
///
/// Owns the `uploading` and `uploaded` collections and is the only place they
/// change. Every method runs to completion without waiting on the transport.
/// Dropping the queue aborts every transfer still in flight.
pub struct UploadQueue {
    policy: Arc<UploadPolicy>,
    transport: Box<dyn TransportAdapter>,
    errors: ErrorLog,
    uploading: TaskList,
    uploaded: TaskList,
    next_id: u64,
}

impl UploadQueue {
    pub fn new<T>(policy: UploadPolicy, transport: T, errors: ErrorLog) -> Self
    where
        T: TransportAdapter + 'static,
    {
        Self {
            policy: Arc::new(policy),
            transport: Box::new(transport),
            errors,
            uploading: TaskList::default(),
            uploaded: TaskList::default(),
            next_id: 0,
        }
    }

    /// Validate and start the given files, returning the ids of created tasks.
    pub fn submit(&mut self, descriptors: impl IntoIterator<Item = FileDescriptor>) -> Vec<TaskId> {
        self.submit_batch(descriptors).accepted
    }

    pub fn submit_batch(&mut self, descriptors: impl IntoIterator<Item = FileDescriptor>) -> SubmitOutcome {
        let (accepted, rejected): (Vec<_>, Vec<_>) = descriptors
            .into_iter()
            .map(|descriptor| {
                let verdict = validate(&descriptor, &self.policy);
                (descriptor, verdict)
            })
            .partition(|(_, verdict)| verdict.is_accepted());

        let mut outcome = SubmitOutcome::default();

        for (descriptor, verdict) in rejected {
            if let ValidationResult::Rejected { reason, limit_mb } = verdict {
                let error = ValidationError::new(reason, &descriptor.name, limit_mb);
                info!(file = %descriptor.name, size = descriptor.size, limit_mb, "file rejected");
                self.errors.push(error.clone());
                outcome.rejected.push(error);
            }
        }

        for (descriptor, _) in accepted {
            let (id, refused) = self.start(descriptor);
            outcome.accepted.push(id);
            outcome.failed.extend(refused);
        }

        outcome
    }

    fn start(&mut self, descriptor: FileDescriptor) -> (TaskId, Option<UploadTask>) {
        let id = self.allocate_id();
        self.uploading.insert(UploadTask::new(id, descriptor));

        let Some(task) = self.uploading.get_mut(id) else {
            return (id, None);
        };

        match self.transport.begin_upload(id, task.descriptor(), &self.policy) {
            Ok(handle) => {
                task.begin(handle);
                debug!(task = %id, file = %task.descriptor().name, "upload started");
                (id, None)
            }
            Err(error) => {
                warn!(task = %id, %error, "transport refused upload");
                task.fail(error);
                (id, self.uploading.remove(id))
            }
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    /// Record transport progress. Returns `false` when the report was ignored.
    pub fn on_progress(&mut self, id: TaskId, loaded: u64, total: u64) -> bool {
        match self.uploading.get_mut(id) {
            Some(task) => task.apply_progress(loaded, total),
            None => {
                debug!(task = %id, "progress for inactive task ignored");
                false
            }
        }
    }

    /// Move a finished upload into `uploaded`.
    pub fn on_completed(&mut self, id: TaskId, result: UploadResult) -> bool {
        if !self.is_in_flight(id) {
            debug!(task = %id, "completion for inactive task ignored");
            return false;
        }

        let Some(mut task) = self.uploading.remove(id) else {
            return false;
        };

        task.complete(result);
        info!(task = %id, file = %task.descriptor().name, "upload completed");
        self.uploaded.insert(task);
        true
    }

    /// Mark an upload failed and take it out of the queue.
    pub fn on_failed(&mut self, id: TaskId, error: TransportError) -> Option<UploadTask> {
        if !self.is_in_flight(id) {
            debug!(task = %id, "failure for inactive task ignored");
            return None;
        }

        let mut task = self.uploading.remove(id)?;
        warn!(task = %id, %error, "upload failed");
        task.fail(error);
        Some(task)
    }

    fn is_in_flight(&self, id: TaskId) -> bool {
        self.uploading
            .get(id)
            .is_some_and(|task| task.state() == UploadState::Uploading)
    }

    /// Abort every transfer and empty `uploading`. Returns the discarded tasks.
    pub fn cancel_all(&mut self) -> Vec<UploadTask> {
        let mut cancelled = self.uploading.drain();
        for task in &mut cancelled {
            task.cancel();
        }

        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "uploads cancelled");
        }

        cancelled
    }

    pub fn cancel_one(&mut self, id: TaskId) -> Result<UploadTask> {
        match self.uploading.remove(id) {
            Some(mut task) => {
                task.cancel();
                info!(task = %id, "upload cancelled");
                Ok(task)
            }
            None if self.uploaded.get(id).is_some() || id.as_u64() < self.next_id => {
                Err(UploadError::TaskFinished(id))
            }
            None => Err(UploadError::UnknownTask(id)),
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.uploading.get(id).or_else(|| self.uploaded.get(id))
    }

    pub fn uploading(&self) -> impl Iterator<Item = &UploadTask> {
        self.uploading.iter()
    }

    pub fn uploaded(&self) -> impl Iterator<Item = &UploadTask> {
        self.uploaded.iter()
    }

    pub fn uploading_count(&self) -> usize {
        self.uploading.len()
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }

    /// Server file ids to attach to the submission.
    pub fn uploaded_file_ids(&self) -> Vec<String> {
        self.uploaded
            .iter()
            .filter_map(|task| task.result())
            .map(|result| result.id.clone())
            .collect()
    }

    pub fn percent_for(&self, id: TaskId) -> Option<u8> {
        self.get(id).map(percent_for)
    }

    pub fn overall_percent(&self) -> u8 {
        overall_percent(self.uploading.iter())
    }

    pub fn is_idle(&self) -> bool {
        self.uploading.is_empty()
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
