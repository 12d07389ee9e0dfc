use std::path::PathBuf;

use anyhow::Context;
use clinic_silver::config::CONFIG_PATH_VAR;
use clinic_silver::{BatchProcessor, CancellationFlag, Credentials, TransformConfig};
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
    let config = TransformConfig::load(config_path.as_deref())
        .context("Failed to load transform configuration")?;
    let credentials = Credentials::from_env();

    info!(
        "Bronze {} -> silver {}",
        config.input_dir.display(),
        config.output_dir.display()
    );

    let cancellation = CancellationFlag::new();
    cancellation.cancel_on_ctrl_c();

    let summary = BatchProcessor::new(config, credentials)
        .with_cancellation(cancellation)
        .run()
        .await
        .context("Transform run aborted")?;

    info!(
        "Run finished with status {:?}: {}/{} units succeeded in {} ms",
        summary.status, summary.succeeded, summary.discovered, summary.elapsed_ms
    );

    std::process::exit(summary.exit_code());
}
