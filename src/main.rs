use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tf_profile_stage::{Config, LifecycleStage, StageOutputs, StageStatus, TfProfileStage};

#[derive(Parser, Debug)]
#[command(
    name = "tf-profile-stage",
    version,
    about = "Profile Terraform logs after deployment stages complete"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the executed stages and profile their apply logs
    Deploy(DeployArgs),
    /// Profile destroy logs for the recorded stage set
    Destroy(DestroyArgs),
    /// Verify every recorded stage has a non-empty report file
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct DeployArgs {
    /// Path to a JSON object mapping stage name to its outputs
    #[arg(long, value_name = "PATH")]
    stage_outputs: PathBuf,
}

#[derive(Parser, Debug)]
struct DestroyArgs {
    /// Path to a JSON object mapping stage name to its outputs
    #[arg(long, value_name = "PATH")]
    stage_outputs: PathBuf,

    /// Path to a JSON object mapping stage name to a success flag
    #[arg(long, value_name = "PATH")]
    status: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to a JSON object mapping stage name to its outputs
    #[arg(long, value_name = "PATH")]
    stage_outputs: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Deploy(args) => cmd_deploy(args),
        Commands::Destroy(args) => cmd_destroy(args),
        Commands::Check(args) => cmd_check(args),
    }
}

fn cmd_deploy(args: DeployArgs) -> Result<()> {
    let outputs = load_stage_outputs(&args.stage_outputs)?;
    let mut stage = TfProfileStage::new(Config::from_env())?;
    stage.deploy(&outputs, &mut || {})?;
    Ok(())
}

fn cmd_destroy(args: DestroyArgs) -> Result<()> {
    let outputs = load_stage_outputs(&args.stage_outputs)?;
    let status = match args.status.as_deref() {
        Some(path) => load_json(path).context("load status")?,
        None => StageStatus::new(),
    };
    let mut stage = TfProfileStage::new(Config::from_env())?;
    stage.destroy(&outputs, &status, &mut || {})?;
    Ok(())
}

fn cmd_check(args: CheckArgs) -> Result<()> {
    let outputs = load_stage_outputs(&args.stage_outputs)?;
    let mut stage = TfProfileStage::new(Config::from_env())?;
    if !stage.check(&outputs)? {
        bail!("report check failed: a recorded stage has no non-empty report file");
    }
    println!("all recorded stages have non-empty report files");
    Ok(())
}

fn load_stage_outputs(path: &Path) -> Result<StageOutputs> {
    load_json(path).context("load stage outputs")
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}
