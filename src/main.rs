//! Command-line entry point: dubs one video file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};

use videodub::logger::init_logger;
use videodub::services::media::ensure_ffmpeg;
use videodub::{DubConfig, DubServices, DubbingEngine, ProgressUpdate};

/// Dub a video's speech into another language, keeping the original timing
#[derive(Parser, Debug)]
#[command(name = "videodub", version, about)]
struct Cli {
    /// Input video file
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Target language code
    #[arg(short, long, value_name = "LANG", default_value = "es")]
    lang: String,

    /// Output video file (default: <name>_dubbed_<lang>.<ext> next to the input)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Path to a JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep temporary files of the run
    #[arg(long)]
    keep_temp: bool,
}

/// `<dir>/<stem>_dubbed_<lang>.<ext>`
fn default_output_path(input: &Path, lang: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}_dubbed_{}.{}", stem, lang, ext.to_string_lossy()),
        None => format!("{}_dubbed_{}", stem, lang),
    };
    input.with_file_name(name)
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.input.is_file() {
        bail!("Input file '{}' not found", cli.input.display());
    }

    let mut config = match &cli.config {
        Some(path) => DubConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DubConfig::default(),
    }
    .apply_env();
    if cli.keep_temp {
        config.keep_temp_files = true;
    }
    config.validate()?;

    ensure_ffmpeg()?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input, &cli.lang));

    let services = DubServices::from_config(&config)?;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ProgressUpdate>(32);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            eprintln!("{}", update);
        }
    });

    let engine = DubbingEngine::new(config, services).with_progress(tx);
    let result = engine.dub(&cli.input, &cli.lang, &output).await;
    drop(engine);
    let _ = printer.await;

    let report = result?;
    info!(
        "Track {} ms -> {} ms ({:?})",
        report.assembled_ms, report.final_ms, report.track
    );
    println!("Dubbed video saved to {}", report.output_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/videos/talk.mp4"), "es"),
            PathBuf::from("/videos/talk_dubbed_es.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("clip"), "fr"),
            PathBuf::from("clip_dubbed_fr")
        );
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["videodub", "-i", "in.mp4"]);
        assert_eq!(cli.lang, "es");
        assert!(cli.output.is_none());
        assert!(!cli.keep_temp);
    }
}
