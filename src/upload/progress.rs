use super::task::UploadTask;
use super::types::UploadState;

/// Floored percentage of `transferred` over `total`, `0` for an empty total.
pub fn percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }

    let value = (transferred.min(total) as u128 * 100) / total as u128;
    value as u8
}

pub fn percent_for(task: &UploadTask) -> u8 {
    percent(task.bytes_transferred(), task.bytes_total())
}

/// 所有上传中任务的总体进度
pub fn overall_percent<'a>(tasks: impl IntoIterator<Item = &'a UploadTask>) -> u8 {
    let (transferred, total) = tasks
        .into_iter()
        .filter(|task| task.state() == UploadState::Uploading)
        .fold((0u128, 0u128), |(transferred, total), task| {
            (transferred + task.bytes_transferred() as u128, total + task.bytes_total() as u128)
        });

    if total == 0 {
        return 0;
    }

    (transferred * 100 / total) as u8
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use crate::upload::transport::CancelHandle;
    use crate::upload::types::{FileDescriptor, TaskId};

    fn uploading(id: u64, transferred: u64, total: u64) -> UploadTask {
        let mut task = UploadTask::new(TaskId::from_raw(id), FileDescriptor::new("f", total, "text/plain"));
        task.begin(CancelHandle::new(CancellationToken::new()));
        task.apply_progress(transferred, total);
        task
    }

    #[test]
    fn test_percent_edges() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(10, 0), 0);
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(10, 10), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(999, 1000), 99);
        assert_eq!(percent(u64::MAX - 1, u64::MAX), 99);
    }

    #[test]
    fn test_percent_for_task() {
        assert_eq!(percent_for(&uploading(1, 50, 200)), 25);
        assert_eq!(percent_for(&uploading(2, 0, 0)), 0);
        assert_eq!(percent_for(&uploading(3, 7, 7)), 100);
    }

    #[test]
    fn test_overall_only_counts_uploading() {
        let a = uploading(1, 100, 100);
        let b = uploading(2, 0, 300);
        let queued = UploadTask::new(TaskId::from_raw(3), FileDescriptor::new("q", 1000, "text/plain"));

        assert_eq!(overall_percent([&a, &b, &queued]), 25);
        assert_eq!(overall_percent(std::iter::empty()), 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }
}
