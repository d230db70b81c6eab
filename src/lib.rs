#![allow(warnings)]

pub mod config;
pub mod upload;

pub use upload::{
    ErrorLog,
    FileDescriptor,
    HttpUploader,
    Result,
    TaskId,
    TransportError,
    UploadError,
    UploadEvent,
    UploadPolicy,
    UploadQueue,
    UploadService,
    UploadServiceHandle,
    UploadState,
};
