use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use deposit_uploader::{
    config::build_config,
    infrastructure::{initialize_telemetry, LocalFileContent, ServiceProvider},
};
use domain_upload::{
    command::AddFileCommand,
    model::{
        entity::FileRecord,
        vo::{DraftLinks, FileLinks, RemoteFile, UploadEvent, UploadState},
    },
    service::SessionCoordinatorService,
};

#[derive(Parser)]
#[command(name = "deposit-uploader", about = "Upload files into a repository draft")]
struct Cli {
    /// Extra YAML configuration files, applied in order.
    #[arg(short, long, global = true)]
    config: Vec<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload local files into the draft.
    Upload {
        /// Self link of the draft, e.g. https://host/api/records/<id>/draft
        #[arg(long)]
        draft: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Copy the files of the previous version into the draft.
    Import {
        #[arg(long)]
        draft: String,
    },
    /// Remove a file from the draft.
    Delete {
        #[arg(long)]
        draft: String,
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match build_config(&cli.config) {
        Ok(el) => el,
        Err(e) => {
            eprintln!("Failed to build config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = initialize_telemetry(&config.telemetry) {
        eprintln!("Failed to initialize logger: {e}");
        return ExitCode::FAILURE;
    }

    let draft = match cli.command {
        Command::Upload { ref draft, .. }
        | Command::Import { ref draft }
        | Command::Delete { ref draft, .. } => draft.to_owned(),
    };
    let draft = match url::Url::parse(&draft) {
        Ok(el) => DraftLinks::new(el.as_str()),
        Err(e) => {
            eprintln!("Invalid draft link {draft}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let coordinator = match ServiceProvider::build(&config, draft.to_owned()) {
        Ok(el) => el.coordinator,
        Err(e) => {
            eprintln!("Failed to build services: {e}");
            return ExitCode::FAILURE;
        }
    };

    let events = coordinator.subscribe().await;
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            log_event(&event);
        }
    });

    let result = match cli.command {
        Command::Upload { files, .. } => upload(coordinator.as_ref(), files).await,
        Command::Import { .. } => import(coordinator.as_ref(), &draft).await,
        Command::Delete { key, .. } => delete(coordinator.as_ref(), &draft, key).await,
    };
    // Closing the event stream lets the logger drain and stop.
    drop(coordinator);
    if let Err(e) = logger.await {
        tracing::warn!("Event logger stopped abnormally: {e}");
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every file was uploaded.
async fn upload(coordinator: &dyn SessionCoordinatorService, files: Vec<PathBuf>) -> anyhow::Result<bool> {
    let mut keys = Vec::with_capacity(files.len());
    for path in files {
        let content = LocalFileContent::open(&path).await?;
        let key = content.key()?;
        let mime_type = content.mime_type();
        let command = AddFileCommand::new(key, Arc::new(content)).with_mime_type(mime_type);
        keys.push(coordinator.admit(command).await?.key);
    }
    let usage = coordinator.quota_usage().await;
    tracing::info!(
        files = usage.files,
        bytes = usage.bytes,
        remaining_bytes = usage.remaining_bytes,
        "Files admitted."
    );

    let uploads = futures::future::join_all(keys.iter().map(|key| coordinator.start(key)));
    tokio::pin!(uploads);
    let results = tokio::select! {
        results = &mut uploads => results,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling uploads.");
            for key in &keys {
                coordinator.cancel(key).await?;
            }
            uploads.await
        }
    };

    let records = coordinator.files().await;
    print_summary(&records);
    Ok(results.iter().all(|el| el.is_ok()))
}

async fn import(coordinator: &dyn SessionCoordinatorService, draft: &DraftLinks) -> anyhow::Result<bool> {
    let records = coordinator.import_parent_files(draft).await?;
    print_summary(&records);
    Ok(true)
}

async fn delete(
    coordinator: &dyn SessionCoordinatorService,
    draft: &DraftLinks,
    key: String,
) -> anyhow::Result<bool> {
    let self_link = draft.file_url(&key);
    coordinator
        .add_remote_file(RemoteFile {
            key: key.to_owned(),
            size: 0,
            checksum: None,
            mimetype: None,
            file_id: None,
            links: FileLinks {
                self_link: Some(self_link),
                ..Default::default()
            },
            status: Some(UploadState::Completed.to_string()),
        })
        .await?;
    coordinator.delete(&key).await?;
    println!("Deleted {key}.");
    Ok(true)
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::Lifecycle(el) => match &el.error {
            Some(error) if error.is_user_facing => {
                tracing::warn!(key = %el.key, state = %el.state, "{}", error.message)
            }
            Some(error) => tracing::error!(key = %el.key, state = %el.state, "{}", error.message),
            None => tracing::info!(
                key = %el.key,
                state = %el.state,
                progress = el.progress_percentage.unwrap_or_default(),
                "Upload progress."
            ),
        },
        UploadEvent::Removed { key } => tracing::info!(key = %key, "File removed from the draft."),
        UploadEvent::Imported { keys } => tracing::info!(?keys, "Files imported."),
    }
}

fn print_summary(records: &[FileRecord]) {
    for record in records {
        let detail = match (&record.checksum, &record.error) {
            (_, Some(error)) => error.message.to_owned(),
            (Some(checksum), None) => checksum.to_owned(),
            (None, None) => String::new(),
        };
        println!(
            "{:<40} {:>12} {:<11} {:>3}% {detail}",
            record.key,
            record.size,
            record.state.to_string(),
            record.progress_percentage
        );
    }
}
