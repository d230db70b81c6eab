use std::sync::{Arc, Mutex, MutexGuard};
use serde::Serialize;
use super::types::{FileDescriptor, UploadPolicy};

/// Reasons a file is refused before it reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    FileTooLarge,
}

impl RejectReason {
    /// Numeric code understood by the client's error display.
    pub fn code(&self) -> u32 {
        match self {
            Self::FileTooLarge => 39,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted,
    Rejected {
        reason: RejectReason,
        limit_mb: u64,
    },
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Check a descriptor against the policy. A file exactly at the limit is rejected.
pub fn validate(descriptor: &FileDescriptor, policy: &UploadPolicy) -> ValidationResult {
    if descriptor.size >= policy.max_size_bytes() {
        return ValidationResult::Rejected {
            reason: RejectReason::FileTooLarge,
            limit_mb: policy.limit_mb(),
        };
    }

    ValidationResult::Accepted
}

/// Error entry shown to the submitter for a refused file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code: u32,
    pub reason: RejectReason,
    pub file_name: String,
    /// Formatting arguments for the localized message, `[limit_mb]`.
    pub arguments: Vec<String>,
}

impl ValidationError {
    pub fn new(reason: RejectReason, file_name: impl Into<String>, limit_mb: u64) -> Self {
        Self {
            code: reason.code(),
            reason,
            file_name: file_name.into(),
            arguments: vec![limit_mb.to_string()],
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            RejectReason::FileTooLarge => write!(
                f,
                "{}: file exceeds {} MB",
                self.file_name,
                self.arguments.first().map(String::as_str).unwrap_or("?"),
            ),
        }
    }
}

/// Append-only list of validation errors shared with the error display.
///
/// Cloning yields another handle onto the same list.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<ValidationError>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: ValidationError) {
        self.lock().push(error);
    }

    pub fn entries(&self) -> Vec<ValidationError> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ValidationError>> {
        // entries are only ever appended, a poisoned list is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const MB: u64 = 1024 * 1024;

    fn policy(limit_mb: u64) -> UploadPolicy {
        UploadPolicy::new(limit_mb, Url::parse("http://localhost/submission/files").unwrap())
    }

    #[test]
    fn test_accepts_below_limit() {
        let result = validate(&FileDescriptor::new("a.pdf", 5 * MB - 1, "application/pdf"), &policy(5));
        assert!(result.is_accepted());

        let empty = validate(&FileDescriptor::new("empty", 0, "text/plain"), &policy(5));
        assert!(empty.is_accepted());
    }

    #[test]
    fn test_rejects_at_and_above_limit() {
        for size in [5 * MB, 5 * MB + 1, 6 * MB] {
            let result = validate(&FileDescriptor::new("big.iso", size, "application/octet-stream"), &policy(5));
            assert_eq!(result, ValidationResult::Rejected {
                reason: RejectReason::FileTooLarge,
                limit_mb: 5,
            });
        }
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let result = validate(&FileDescriptor::new("empty", 0, "text/plain"), &policy(0));
        assert!(!result.is_accepted());
    }

    #[test]
    fn test_validation_error_message() {
        let error = ValidationError::new(RejectReason::FileTooLarge, "big.iso", 5);
        assert_eq!(error.code, 39);
        assert_eq!(error.arguments, vec!["5".to_string()]);
        assert_eq!(error.to_string(), "big.iso: file exceeds 5 MB");
    }

    #[test]
    fn test_error_log_shared_between_handles() {
        let log = ErrorLog::new();
        let display = log.clone();
        assert!(display.is_empty());

        log.push(ValidationError::new(RejectReason::FileTooLarge, "x", 1));
        assert_eq!(display.len(), 1);
        assert_eq!(display.entries()[0].file_name, "x");
    }
}
