use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use resultpub_common::config::UploaderConfig;
use resultpub_common::Project;
use resultpub_uploader::backend;

const USAGE: &str = "usage: resultpub <config.json> <repository> <engine-tag> <file>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        bail!(USAGE);
    }
    let config_path = PathBuf::from(&args[0]);
    let files: Vec<PathBuf> = args[3..].iter().map(PathBuf::from).collect();

    let config = UploaderConfig::load(&config_path)?;
    let project = Project::starting_now(&args[1], &args[2]);
    info!(
        provider = config.provider(),
        destination = %project.destination_path(),
        "resultpub starting"
    );

    let mut uploader = backend::from_config(&config, project)?;
    uploader
        .connect()
        .await
        .context("Failed to connect to the storage service")?;
    uploader
        .create_project_folder()
        .await
        .context("Failed to create the project folder")?;

    let mut failed = 0;
    for file in &files {
        let Some(name) = remote_name(file) else {
            error!(path = %file.display(), "Not a file name, skipping");
            failed += 1;
            continue;
        };
        if uploader.upload_file(file, &name).await.is_err() {
            failed += 1;
        }
    }

    if let Some(url) = uploader.url() {
        println!("{}", url);
    }
    uploader.close();

    info!(
        uploaded = files.len() - failed,
        failed = failed,
        "resultpub finished"
    );
    if failed > 0 {
        bail!("{} of {} files failed to upload", failed, files.len());
    }
    Ok(())
}

fn remote_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
