use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use super::manager::UploadQueue;
use super::progress::percent_for;
use super::task::UploadTask;
use super::types::{FileDescriptor, ServiceCommand, TaskId, TransportEvent, UploadEvent, UploadState};

pub struct UploadServiceWorker {
    queue: UploadQueue,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl UploadServiceWorker {
    pub(crate) async fn run(
        queue: UploadQueue,
        mut command_rx: mpsc::Receiver<ServiceCommand>,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let mut worker = Self { queue, event_tx };

        // 主事件循环，一次只处理一个命令或传输事件
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command),
                    None => break,
                },
                Some(event) = transport_rx.recv() => {
                    worker.handle_transport_event(event);
                }
            }
        }

        let cancelled = worker.queue.cancel_all();
        debug!(cancelled = cancelled.len(), "upload service stopped");
    }

    fn handle_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Submit { descriptors, reply } => {
                let ids = self.submit(descriptors);
                let _ = reply.send(ids);
            }
            ServiceCommand::CancelUpload { id, reply } => {
                let old_state = self.queue.get(id).map(UploadTask::state);
                let result = self.queue.cancel_one(id).map(|task| {
                    if let Some(old_state) = old_state {
                        self.emit_state_change(task.id(), old_state, task.state());
                    }
                });
                let _ = reply.send(result);
            }
            ServiceCommand::CancelAll { reply } => {
                let states: Vec<(TaskId, UploadState)> = self.queue
                    .uploading()
                    .map(|task| (task.id(), task.state()))
                    .collect();
                let cancelled = self.queue.cancel_all();
                for (id, old_state) in states {
                    self.emit_state_change(id, old_state, UploadState::Cancelled);
                }
                let _ = reply.send(cancelled.len());
            }
            ServiceCommand::GetTask { id, reply } => {
                let _ = reply.send(self.queue.get(id).map(UploadTask::snapshot));
            }
            ServiceCommand::GetUploading { reply } => {
                let _ = reply.send(self.queue.uploading().map(UploadTask::snapshot).collect());
            }
            ServiceCommand::GetUploaded { reply } => {
                let _ = reply.send(self.queue.uploaded().map(UploadTask::snapshot).collect());
            }
            ServiceCommand::UploadedFileIds { reply } => {
                let _ = reply.send(self.queue.uploaded_file_ids());
            }
            ServiceCommand::OverallProgress { reply } => {
                let _ = reply.send(self.queue.overall_percent());
            }
        }
    }

    fn submit(&mut self, descriptors: Vec<FileDescriptor>) -> Vec<TaskId> {
        let outcome = self.queue.submit_batch(descriptors);

        for error in outcome.rejected {
            let _ = self.event_tx.send(UploadEvent::Rejected(error));
        }

        for id in &outcome.accepted {
            if self.queue.get(*id).is_some() {
                self.emit_state_change(*id, UploadState::Queued, UploadState::Uploading);
            }
        }

        for task in outcome.failed {
            self.emit_failed(&task, UploadState::Queued);
        }

        outcome.accepted
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Progress { id, loaded, total } => {
                if !self.queue.on_progress(id, loaded, total) {
                    return;
                }

                if let Some(task) = self.queue.get(id) {
                    let _ = self.event_tx.send(UploadEvent::Progress {
                        id,
                        bytes_transferred: task.bytes_transferred(),
                        bytes_total: task.bytes_total(),
                        percent: percent_for(task),
                        overall_percent: self.queue.overall_percent(),
                    });
                }
            }
            TransportEvent::Completed { id, result } => {
                if !self.queue.on_completed(id, result.clone()) {
                    return;
                }

                self.emit_state_change(id, UploadState::Uploading, UploadState::Completed);
                let _ = self.event_tx.send(UploadEvent::Completed { id, result });
                self.check_idle();
            }
            TransportEvent::Failed { id, error } => {
                if let Some(task) = self.queue.on_failed(id, error) {
                    self.emit_failed(&task, UploadState::Uploading);
                    self.check_idle();
                }
            }
        }
    }

    fn emit_failed(&self, task: &UploadTask, old_state: UploadState) {
        self.emit_state_change(task.id(), old_state, UploadState::Failed);
        if let Some(error) = task.error() {
            let _ = self.event_tx.send(UploadEvent::Failed {
                id: task.id(),
                error: error.clone(),
            });
        }
    }

    fn check_idle(&self) {
        if self.queue.is_idle() {
            info!(uploaded = self.queue.uploaded_count(), "upload queue drained");
            let _ = self.event_tx.send(UploadEvent::AllCompleted {
                uploaded: self.queue.uploaded_count(),
            });
        }
    }

    fn emit_state_change(&self, id: TaskId, old_state: UploadState, new_state: UploadState) {
        let _ = self.event_tx.send(UploadEvent::StateChanged {
            id,
            old_state,
            new_state,
        });
    }
}
