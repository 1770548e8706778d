//! trackview - terminal front-end
//!
//! Runs one session over a video file (or any source selector) on the calling thread
//! and writes the enabled exports to the output directory. Ctrl-C stops the session
//! cleanly.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use trackview::ui::{Ui, UiMode};
use trackview::{Accelerator, AppConfig, Controller, ModelProfile, SourceSelector};

#[derive(Parser, Debug)]
#[command(author, version, about = "YOLOv8 object tracker, terminal version")]
struct Args {
    /// Video file, camera index or stub:// source. Prompted for when omitted.
    #[arg(long, short)]
    input: Option<String>,
    /// Model profile.
    #[arg(long, short, value_enum)]
    profile: Option<ModelProfile>,
    /// Explicit weight file; overrides --profile.
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Directory for exported files.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Do not write the annotated video.
    #[arg(long)]
    no_video: bool,
    /// Do not write the text log.
    #[arg(long)]
    no_log: bool,
    /// Terminal output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("YOLOv8 Object Tracker - Terminal Version");
    if let Err(err) = run(Args::parse()) {
        println!("Tracking failed.");
        println!("Error: {:#}", err);
    }
}

fn run(args: Args) -> Result<()> {
    let ui = Ui::detect(args.ui);
    let mut config = AppConfig::load()?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.no_video {
        config.export_video = false;
    }
    if args.no_log {
        config.export_log = false;
    }
    if args.weights.is_none() {
        config.profile = Some(args.profile.or(config.profile).unwrap_or_default());
    } else {
        config.profile = None;
    }
    log::info!("{}", Accelerator::detect().message());

    let input = match args.input {
        Some(input) => input,
        None => prompt("Enter the path to your video file (e.g., video.mp4): ")?,
    };
    let selector = SourceSelector::parse(&input)?;
    if is_missing_file(&selector) {
        println!("Error: File not found.");
        return Ok(());
    }

    let mut controller = {
        let _stage = ui.stage("Loading model");
        let controller = Controller::from_config(&config)?;
        if let Some(weights) = &args.weights {
            controller.load_weights(weights)?;
        }
        controller
    };
    let file = match &selector {
        SourceSelector::File(path) => Some(path.clone()),
        _ => None,
    };
    match file {
        Some(path) => controller.select_file(&path)?,
        None => controller.select_source(selector),
    }

    let stop = controller.stop_handle();
    ctrlc::set_handler(move || stop.request())
        .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    println!("Running YOLOv8 Tracker...");
    let mut presenter = ui.presenter();
    let report = controller.run_blocking(&mut presenter)?;
    if !report.is_success() {
        return Err(anyhow!("{}", report.status_text()));
    }

    if let Some(path) = &report.video_path {
        log::info!("video: {} ({} frames)", path.display(), report.video_frames);
    }
    if let Some(path) = &report.log_path {
        log::info!("log: {} ({} lines)", path.display(), report.log_lines);
    }
    println!(
        "Tracking complete! Output saved in '{}'",
        controller.output_dir().display()
    );
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Directories and dangling paths both count as missing.
fn is_missing_file(selector: &SourceSelector) -> bool {
    matches!(selector, SourceSelector::File(path) if !path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_not_video_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let selector = SourceSelector::File(dir.path().to_path_buf());
        assert!(is_missing_file(&selector));
        assert!(!is_missing_file(&SourceSelector::webcam()));
        Ok(())
    }

    #[test]
    fn missing_input_returns_normally() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("absent.mp4");
        let args = Args::try_parse_from([
            "trackview",
            "--input",
            missing.to_str().ok_or_else(|| anyhow!("non-UTF-8 temp path"))?,
            "--ui",
            "plain",
        ])?;
        run(args)?;

        let args = Args::try_parse_from([
            "trackview",
            "--input",
            dir.path().to_str().ok_or_else(|| anyhow!("non-UTF-8 temp path"))?,
            "--ui",
            "plain",
        ])?;
        run(args)?;
        assert!(std::fs::read_dir(dir.path())?.next().is_none());
        Ok(())
    }
}
