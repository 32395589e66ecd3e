//! proctorcam-cli - command line client for the detection backend
//!
//! This tool provides commands for:
//! - Uploading a video and printing the verdict and statistics
//! - Sending a single chat message to the assistant
//! - Checking configuration and backend reachability
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/proctorcam/config.toml (~/.config/proctorcam/config.toml)
//! - Logs: $XDG_STATE_HOME/proctorcam/ (~/.local/state/proctorcam/)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use proctorcam_core::{AnalysisResult, Config, Services, UploadOutcome};
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "proctorcam-cli")]
#[command(about = "Upload exam recordings for cheating detection")]
#[command(version)]
struct Args {
    /// Verbose output (writes the log file)
    #[arg(short, long)]
    verbose: bool,

    /// Backend base URL (default: from config)
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a video and print the verdict
    Upload {
        /// Video file to analyze
        file: PathBuf,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one message to the assistant and print the reply
    Chat {
        /// Message text
        message: String,
    },

    /// Show configuration and backend reachability
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(url) = args.backend {
        config.backend.base_url = url;
        config
            .backend
            .validate()
            .context("invalid --backend value")?;
    }
    // Nothing here can show a preview frame
    config.media.previews = false;

    // Initialize logging if verbose
    let _log_guard = if args.verbose {
        Some(
            proctorcam_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let services = Services::from_config(&config).context("failed to set up backend client")?;

    match args.command {
        Command::Upload { file, json } => cmd_upload(&services, file, json).await,
        Command::Chat { message } => cmd_chat(&services, &message).await,
        Command::Status => cmd_status(&config, &services).await,
    }
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .context("invalid progress template")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Cancelled on Ctrl+C so the in-flight request is dropped cleanly.
fn interrupt_signal() -> Result<Arc<Notify>> {
    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        notify.notify_one();
    })
    .context("failed to set Ctrl+C handler")?;
    Ok(interrupted)
}

async fn cmd_upload(services: &Services, file: PathBuf, json: bool) -> Result<()> {
    services
        .uploads
        .select_file(&file)
        .with_context(|| format!("failed to open {}", file.display()))?;

    if let Some(video) = services.store.snapshot().video {
        println!("Video:  {} ({:.2} MB)", video.name, video.size_mb);
    }

    let interrupted = interrupt_signal()?;
    let pb = spinner("Uploading and analyzing...".to_string())?;

    let result = tokio::select! {
        result = services.uploads.upload() => result,
        _ = interrupted.notified() => {
            pb.finish_and_clear();
            bail!("upload cancelled");
        }
    };
    pb.finish_and_clear();

    let state = services.store.snapshot();
    match result {
        Ok(UploadOutcome::Completed { .. }) => {
            println!("Status: {}", state.status_message);
            if let Some(secs) = state.video.as_ref().and_then(|v| v.duration_seconds) {
                println!("Length: {:.1}s", secs);
            }

            match &state.analysis {
                Some(analysis) if json => {
                    println!("{}", serde_json::to_string_pretty(analysis)?);
                }
                Some(analysis) => print_analysis(analysis),
                None => println!("No analysis details were returned."),
            }
            Ok(())
        }
        Ok(UploadOutcome::Superseded { .. }) => bail!("upload superseded by another file"),
        Err(e) => {
            eprintln!("{}", state.status_message);
            Err(e).context("upload failed")
        }
    }
}

fn print_analysis(analysis: &AnalysisResult) {
    let stats = &analysis.statistics;

    println!();
    println!("Analysis");
    println!("========");
    println!("Processing ratio:     {}", stats.processing_ratio);
    println!("Face detection rate:  {}", stats.face_detection_rate);
    println!("Lookaway ratio:       {}", stats.lookaway_ratio);
    println!(
        "Frames processed:     {} / {}",
        stats.processed_frames, stats.total_frames
    );
    println!(
        "Multiple faces:       {}",
        if stats.multiple_faces_detected {
            "yes"
        } else {
            "no"
        }
    );

    if !analysis.reasons.is_empty() {
        println!();
        println!("Reasons:");
        for reason in &analysis.reasons {
            println!("  - {}", reason);
        }
    }

    if !analysis.raw_counts.is_empty() {
        println!();
        println!("Raw counts:");
        for (name, value) in &analysis.raw_counts {
            println!("  {:<22} {}", name, value);
        }
    }
}

async fn cmd_chat(services: &Services, message: &str) -> Result<()> {
    let interrupted = interrupt_signal()?;
    let pb = spinner("Waiting for the assistant...".to_string())?;

    let reply = tokio::select! {
        reply = services.chat.send(message) => reply,
        _ = interrupted.notified() => {
            pb.finish_and_clear();
            bail!("chat cancelled");
        }
    };
    pb.finish_and_clear();

    let Some(reply) = reply else {
        bail!("message is empty");
    };

    match &reply.tag {
        Some(tag) => println!("[{}] {}", tag, reply.content),
        None => println!("{}", reply.content),
    }
    Ok(())
}

async fn cmd_status(config: &Config, services: &Services) -> Result<()> {
    println!("proctorcam Configuration");
    println!("========================");
    println!();
    println!("Config file:     {}", Config::config_path().display());
    println!(
        "Log files:       {}",
        proctorcam_core::logging::log_file_pattern().display()
    );
    println!();
    println!("Backend URL:     {}", services.backend.base_url());
    println!(
        "Upload timeout:  {}s",
        config.backend.upload_timeout_secs
    );
    println!("Chat timeout:    {}s", config.backend.chat_timeout_secs);
    println!("Chat ordering:   {:?}", config.chat.ordering);
    println!("ffprobe:         {}", config.media.ffprobe_path.display());
    println!("ffmpeg:          {}", config.media.ffmpeg_path.display());
    println!();

    let reachable = services
        .backend
        .health_check()
        .await
        .context("failed to check backend")?;
    if reachable {
        println!("Backend:         reachable");
    } else {
        println!("Backend:         unreachable");
    }

    Ok(())
}
