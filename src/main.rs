use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use dropzone::config::Config;
use dropzone::upload::format_bytes;
use dropzone::{ErrorLog, FileDescriptor, HttpUploader, UploadEvent, UploadService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load_config("config.toml").context("Can't load config.toml")?;
    let policy = config.policy().context("Invalid upload policy")?;

    let mut descriptors = Vec::new();
    for path in std::env::args().skip(1) {
        let descriptor = FileDescriptor::from_path(&path)
            .await
            .with_context(|| format!("Failed to read file: {}", path))?;
        descriptors.push(descriptor);
    }

    if descriptors.is_empty() {
        anyhow::bail!("usage: dropzone <file>...");
    }

    let errors = ErrorLog::new();
    let handle = UploadService::spawn(policy, HttpUploader::new(), errors.clone(), config.event_capacity);
    let service = handle.service.clone();
    let mut events = service.subscribe_events();

    service.submit(descriptors).await?;
    for error in errors.entries() {
        warn!(code = error.code, "{}", error);
    }

    while !service.uploading().await?.is_empty() {
        tokio::select! {
            event = events.recv() => match event {
                Ok(UploadEvent::Progress { id, bytes_transferred, bytes_total, overall_percent, .. }) => {
                    info!(
                        task = %id,
                        "{} / {} ({}% overall)",
                        format_bytes(bytes_transferred),
                        format_bytes(bytes_total),
                        overall_percent,
                    );
                }
                Ok(UploadEvent::Completed { id, result }) => {
                    info!(task = %id, file_id = %result.id, "uploaded");
                }
                Ok(UploadEvent::Failed { id, error }) => {
                    warn!(task = %id, %error, "upload failed");
                }
                Ok(UploadEvent::AllCompleted { .. }) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "upload events dropped");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let cancelled = service.cancel_all().await?;
                warn!(cancelled, "uploads cancelled");
                break;
            }
        }
    }

    // file ids to attach to the submission
    let file_ids = service.uploaded_file_ids().await?;
    println!("{}", serde_json::to_string(&file_ids)?);

    drop(service);
    handle.shutdown().await?;

    Ok(())
}
