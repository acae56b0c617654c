#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use channel_comments::channel::ChannelProcessor;
use channel_comments::config::{ConfigOverrides, resolve_config};
use channel_comments::error::RunError;
use channel_comments::model::ChannelRun;
use clap::Parser;
use serde_json::{Value, json};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Extract comments from the newest unprocessed videos of a channel.
///
/// Prints a JSON summary on stdout; logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "extract_channel", version)]
struct Cli {
    /// Channel URL, e.g. https://www.youtube.com/@handle
    channel_url: String,

    /// Number of newly processed videos to aim for.
    #[arg(short = 'n', long = "videos", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..))]
    videos: u64,

    /// Also merge this run's per-video files into one CSV.
    #[arg(long)]
    combined: bool,

    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    extracted_dir: Option<PathBuf>,

    #[arg(long = "ledger", value_name = "FILE")]
    ledger_path: Option<PathBuf>,

    #[arg(long = "yt-dlp", value_name = "PATH")]
    yt_dlp_bin: Option<PathBuf>,

    #[arg(long = "env-file", value_name = "FILE")]
    env_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let output = match run(cli).await {
        Ok(run) => success_output(&run),
        Err(err) => {
            error!(error = %err, "extraction failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            println!("{}", error_output(&err));
            std::process::exit(1);
        }
    };
    println!("{output}");
}

async fn run(cli: Cli) -> Result<ChannelRun> {
    let config = resolve_config(ConfigOverrides {
        data_root: cli.data_root,
        extracted_dir: cli.extracted_dir,
        ledger_path: cli.ledger_path,
        yt_dlp_bin: cli.yt_dlp_bin,
        env_path: cli.env_path,
    })
    .context("loading configuration")?;

    let target = usize::try_from(cli.videos).context("--videos is too large")?;
    let processor = ChannelProcessor::from_config(config);
    let run = processor
        .process_channel(&cli.channel_url, target, cli.combined)
        .await?;
    Ok(run)
}

fn success_output(run: &ChannelRun) -> Value {
    let mut output = json!({
        "status": "success",
        "analytics": run.report,
        "artifactPath": run.artifact_path(),
    });
    if let Some(err) = &run.combined_error {
        output["combinedError"] = json!(err);
    }
    output
}

fn error_output(err: &anyhow::Error) -> Value {
    let not_found = err
        .downcast_ref::<RunError>()
        .is_some_and(RunError::is_not_found);
    json!({
        "status": "error",
        "kind": if not_found { "not_found" } else { "internal" },
        "message": err.to_string(),
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
