mod client;
mod errors;
mod manager;
mod progress_stream;
mod service;
mod service_worker;
mod task;
mod worker;
pub mod progress;
pub mod transport;
pub mod types;
pub mod validator;

pub use client::HttpUploader;
pub use errors::{Result, TransportError, UploadError};
pub use manager::{SubmitOutcome, UploadQueue};
pub use progress::{format_bytes, overall_percent, percent, percent_for};
pub use service::{FilteredEventReceiver, UploadService, UploadServiceHandle};
pub use task::UploadTask;
pub use transport::{CancelHandle, ProgressSink, SpawningTransport, TransportAdapter, Uploader};
pub use types::{
    FileDescriptor, FileSource, TaskId, TaskSnapshot, TransportEvent, UploadEvent, UploadPolicy,
    UploadResult, UploadState, SESSION_HEADER,
};
pub use validator::{validate, ErrorLog, RejectReason, ValidationError, ValidationResult};
