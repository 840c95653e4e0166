use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use pharmaflow_tracking::openapi::ApiDocV1;
use utoipa::OpenApi;

/// Writes the OpenAPI document of the tracking API to disk.
#[derive(Debug, Parser)]
#[command(name = "openapi-export", version)]
struct Cli {
    /// Output file
    #[arg(long, short, default_value = "openapi/pharmaflow-tracking.v1.json")]
    output: PathBuf,

    /// Write compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let openapi = ApiDocV1::openapi();
    let json = if cli.compact {
        serde_json::to_string(&openapi)?
    } else {
        serde_json::to_string_pretty(&openapi)?
    };

    if let Some(dir) = cli.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(&cli.output, json)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!("OpenAPI document written to {}", cli.output.display());
    Ok(())
}
