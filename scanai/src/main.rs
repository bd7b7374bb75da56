mod collaborators;
mod error;
mod logging;
mod supervisor;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use scanai_proto::{ClassTable, PipelineConfig};
use scanai_transport::Endpoint;

use collaborators::{FillerEncoder, StaticTokenProvider, SyntheticCamera};
use supervisor::Supervisor;

/// ScanAI vision pipeline client.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Inference server endpoint, e.g. udp://127.0.0.1:9999 or tcp://127.0.0.1:9999
    #[arg(long, default_value = "udp://127.0.0.1:9999")]
    endpoint: String,

    /// Path to a TOML config file overriding pipeline defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Static auth token to present on every upload (demo only).
    #[arg(long)]
    token: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(PipelineConfig::from_toml_str(&text)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match load_config(args.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let endpoint = match Endpoint::parse(&args.endpoint) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "invalid endpoint");
            return ExitCode::FAILURE;
        }
    };

    let class_table = ClassTable::default_table();
    let camera = Box::new(SyntheticCamera::new());
    let encoder = Box::new(FillerEncoder::new(1280, 720, 4096));
    let auth = Box::new(StaticTokenProvider(args.token));

    let supervisor = Supervisor::new(config, class_table, endpoint, camera, encoder, auth);

    match supervisor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pipeline exited");
            ExitCode::FAILURE
        }
    }
}
