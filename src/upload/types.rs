use std::path::{Path, PathBuf};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;
use super::errors::{Result, TransportError, UploadError};
use super::validator::ValidationError;

/// Header carrying the session credential on every upload request.
pub const SESSION_HEADER: &str = "x-session";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// 上传任务标识，队列内单调递增，移除后不会复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadState {
    /// 已通过校验，等待传输层接收
    Queued,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Cancelled,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Where the bytes of a descriptor live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
    /// Metadata only, as reported by a file picker. A transport that needs
    /// the content has to obtain it elsewhere.
    Detached,
}

/// Read-only description of a file selected for upload.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub source: FileSource,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: content_type.into(),
            last_modified: None,
            source: FileSource::Detached,
        }
    }

    pub fn from_bytes(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            content_type: content_type.into(),
            last_modified: Some(Utc::now()),
            source: FileSource::Memory(data),
        }
    }

    /// Build a descriptor from a file on disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::ParamError(format!("Not a file: {}", path.display())));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::ParamError(format!("Invalid file name: {}", path.display())))?
            .to_string();

        Ok(Self {
            content_type: guess_content_type(&name).to_string(),
            name,
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            source: FileSource::Path(path.to_path_buf()),
        })
    }
}

fn guess_content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "odt" => "application/vnd.oasis.opendocument.text",
        _ => "application/octet-stream",
    }
}

/// Constraints applied to every upload of one queue.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    limit_mb: u64,
    endpoint: Url,
    headers: HeaderMap,
}

impl UploadPolicy {
    pub fn new(limit_mb: u64, endpoint: Url) -> Self {
        Self {
            limit_mb,
            endpoint,
            headers: HeaderMap::new(),
        }
    }

    /// Attach the session credential sent with every upload.
    pub fn with_session(mut self, session_id: &str) -> Result<Self> {
        self.headers.insert(
            HeaderName::from_static(SESSION_HEADER),
            HeaderValue::from_str(session_id)?,
        );
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn limit_mb(&self) -> u64 {
        self.limit_mb
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.limit_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// File record returned by the node once an upload is stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadResult {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub creation_date: Option<String>,
}

/// Events a transport delivers for the uploads it was asked to start.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Progress {
        id: TaskId,
        loaded: u64,
        total: u64,
    },
    Completed {
        id: TaskId,
        result: UploadResult,
    },
    Failed {
        id: TaskId,
        error: TransportError,
    },
}

/// Read-only view of a task, safe to hand out of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub content_type: String,
    pub state: UploadState,
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub percent: u8,
    pub error: Option<String>,
    pub result: Option<UploadResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 任务状态变更
    StateChanged {
        id: TaskId,
        old_state: UploadState,
        new_state: UploadState,
    },

    /// 进度更新
    Progress {
        id: TaskId,
        bytes_transferred: u64,
        bytes_total: u64,
        percent: u8,
        overall_percent: u8,
    },

    /// 文件未通过校验
    Rejected(ValidationError),

    /// 任务完成
    Completed {
        id: TaskId,
        result: UploadResult,
    },

    /// 任务失败
    Failed {
        id: TaskId,
        error: TransportError,
    },

    /// 队列中没有正在上传的任务
    AllCompleted {
        uploaded: usize,
    },
}

/// 上传服务命令
pub enum ServiceCommand {
    /// 批量添加
    Submit {
        descriptors: Vec<FileDescriptor>,
        reply: oneshot::Sender<Vec<TaskId>>,
    },

    /// 取消
    CancelUpload {
        id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 取消所有
    CancelAll {
        reply: oneshot::Sender<usize>,
    },

    /// 获取任务信息
    GetTask {
        id: TaskId,
        reply: oneshot::Sender<Option<TaskSnapshot>>,
    },

    GetUploading {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },

    GetUploaded {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },

    /// 提交时附带的文件 ID
    UploadedFileIds {
        reply: oneshot::Sender<Vec<String>>,
    },

    OverallProgress {
        reply: oneshot::Sender<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_limit_in_bytes() {
        let policy = UploadPolicy::new(5, Url::parse("http://127.0.0.1:8082/submission/files").unwrap());
        assert_eq!(policy.limit_mb(), 5);
        assert_eq!(policy.max_size_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_policy_session_header() {
        let policy = UploadPolicy::new(1, Url::parse("http://localhost/files").unwrap())
            .with_session("abc123")
            .unwrap();
        assert_eq!(policy.headers().get("X-Session").unwrap(), "abc123");

        let policy = policy.with_header(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        assert_eq!(policy.headers().len(), 2);

        let bad = UploadPolicy::new(1, Url::parse("http://localhost/files").unwrap())
            .with_session("line\nbreak");
        assert!(bad.is_err());
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type("leak.PDF"), "application/pdf");
        assert_eq!(guess_content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!UploadState::Queued.is_terminal());
        assert!(!UploadState::Uploading.is_terminal());
        assert!(UploadState::Completed.is_terminal());
        assert!(UploadState::Failed.is_terminal());
        assert!(UploadState::Cancelled.is_terminal());
    }

    #[test]
    fn test_upload_result_from_server_record() {
        let json = r#"[{"id": "f-1", "name": "a.txt", "size": 12, "content_type": "text/plain"}]"#;
        let records: Vec<UploadResult> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].id, "f-1");
        assert_eq!(records[0].creation_date, None);
    }

    #[tokio::test]
    async fn test_descriptor_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.txt");
        tokio::fs::write(&path, b"twelve bytes").await.unwrap();

        let descriptor = FileDescriptor::from_path(&path).await.unwrap();
        assert_eq!(descriptor.name, "evidence.txt");
        assert_eq!(descriptor.size, 12);
        assert_eq!(descriptor.content_type, "text/plain");
        assert!(matches!(descriptor.source, FileSource::Path(_)));

        assert!(FileDescriptor::from_path(dir.path()).await.is_err());
    }
}
