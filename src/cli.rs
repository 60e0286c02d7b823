// ============================================================================
// ChartMark CLI: headless annotation via command-line arguments
// ============================================================================
//
// Usage examples:
//   chartmark --background root-canal.png --actions marks.txt --save ann.png
//   chartmark -b https://host/chart.png -a previous.png --actions more.txt --download
//   chartmark -b chart.jpg --actions marks.txt --download --download-dir out/
//
// The background load runs on the rayon pool exactly as in an interactive
// host; the CLI simply blocks until it is ready.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::SurfaceError;
use crate::io::BackgroundSource;
use crate::project::{ChartSession, FileSink};
use crate::replay;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ChartMark headless chart annotator.
///
/// Replays an action script over a reference diagram and writes the
/// annotation and/or the flattened composite.
#[derive(Parser, Debug)]
#[command(
    name = "chartmark",
    about = "ChartMark headless chart annotator",
    long_about = "Load a reference diagram, optionally restore a previously saved\n\
                  annotation, replay drawing actions and export the result.\n\n\
                  Example:\n  \
                  chartmark --background chart.png --actions marks.txt --save ann.png"
)]
pub struct CliArgs {
    /// Background diagram: file path or http(s) URL.
    #[arg(short, long, value_name = "PATH|URL")]
    pub background: String,

    /// Previously saved annotation-only PNG to start from.
    #[arg(short, long, value_name = "PNG")]
    pub annotation: Option<PathBuf>,

    /// Action script to replay (see `replay` for the command set).
    #[arg(long, value_name = "FILE")]
    pub actions: Option<PathBuf>,

    /// Write the annotation-only PNG here.
    #[arg(short, long, value_name = "PNG")]
    pub save: Option<PathBuf>,

    /// Write the background+annotation composite with a generated name.
    #[arg(short, long)]
    pub download: bool,

    /// Directory for --download (overrides the config file).
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Logical width the background is fitted to.
    #[arg(long, value_name = "PX")]
    pub target_width: Option<u32>,

    /// Physical pixels per logical pixel.
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f32>,

    /// Settings file (defaults to the platform config location).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print progress and echo log lines to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Settings from the config file with command-line overrides applied.
    pub fn resolve_settings(&self) -> EditorSettings {
        let mut settings = match &self.config {
            Some(path) => EditorSettings::load_from(path),
            None => EditorSettings::load(),
        };
        if let Some(w) = self.target_width.filter(|w| *w > 0) {
            settings.target_width = w;
        }
        if let Some(s) = self.scale.filter(|s| s.is_finite()) {
            settings.scale_factor = s.clamp(1.0, 8.0);
        }
        if let Some(dir) = &self.download_dir {
            settings.download_dir = Some(dir.clone());
        }
        settings
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one headless session and return an OS exit code.
/// `0` = success, `1` = any failure.
pub fn run(args: CliArgs) -> ExitCode {
    if args.verbose {
        crate::logger::echo_to_stderr(true);
        if let Some(path) = crate::logger::log_path() {
            println!("Log: {}", path.display());
        }
    }
    match run_session(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_err!("CLI: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_session(args: &CliArgs) -> Result<(), String> {
    let start = Instant::now();
    let settings = args.resolve_settings();

    let previous = match &args.annotation {
        Some(path) => Some(
            std::fs::read(path)
                .map_err(|e| format!("could not read annotation '{}': {}", path.display(), e))?,
        ),
        None => None,
    };

    // Script parse errors should surface before any network fetch.
    let script = match &args.actions {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("could not read actions '{}': {}", path.display(), e))?;
            replay::parse_script(&text).map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => Vec::new(),
    };

    let source = BackgroundSource::parse(&args.background);
    let mut session = ChartSession::open(source, previous, settings);
    session
        .surface_mut()
        .wait_ready()
        .map_err(|e| e.to_string())?;

    if args.verbose
        && let Some(size) = session.surface().logical_size()
    {
        println!(
            "Loaded {} ({}x{} logical) in {:.0}ms",
            session.name,
            size.x,
            size.y,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    if !script.is_empty() {
        let report = replay::play(session.surface_mut(), &script).map_err(|e| e.to_string())?;
        if args.verbose {
            println!(
                "Replayed {} commands: {} commits, {} restores",
                report.commands, report.commits, report.restores
            );
        }
    }

    if let Some(path) = &args.save {
        let mut sink = FileSink { path: path.clone() };
        session
            .save(&mut sink)
            .map_err(|e: SurfaceError| e.to_string())?;
        if args.verbose {
            println!("Saved annotation → {}", path.display());
        }
    }

    if args.download {
        let path = session.download().map_err(|e| e.to_string())?;
        println!("{}", path.display());
    }

    session.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn parses_flags() {
        let args = CliArgs::try_parse_from([
            "chartmark",
            "--background",
            "chart.png",
            "--actions",
            "a.txt",
            "--save",
            "out.png",
            "--download",
            "--target-width",
            "300",
            "--scale",
            "3",
        ])
        .unwrap();
        assert_eq!(args.background, "chart.png");
        assert!(args.download);
        assert_eq!(args.target_width, Some(300));
        assert!(CliArgs::try_parse_from(["chartmark"]).is_err());
    }

    #[test]
    fn end_to_end_save_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("chart.png");
        RgbaImage::from_pixel(40, 20, Rgba([0, 0, 255, 255]))
            .save(&bg_path)
            .unwrap();
        let actions = dir.path().join("marks.txt");
        std::fs::write(&actions, "color #ff0000\nsize 2\ndown 5 10\nmove 35 10\nup\n").unwrap();
        let cfg = dir.path().join("none.cfg");
        let out = dir.path().join("ann.png");

        let args = CliArgs {
            background: bg_path.display().to_string(),
            annotation: None,
            actions: Some(actions),
            save: Some(out.clone()),
            download: true,
            download_dir: Some(dir.path().join("dl")),
            target_width: Some(40),
            scale: Some(2.0),
            config: Some(cfg),
            verbose: false,
        };
        assert_eq!(run(args), ExitCode::SUCCESS);

        let ann = image::open(&out).unwrap().into_rgba8();
        assert_eq!(ann.dimensions(), (80, 40));
        assert_eq!(*ann.get_pixel(40, 20), Rgba([255, 0, 0, 255]));
        assert_eq!(ann.get_pixel(2, 2)[3], 0);
        let downloads: Vec<_> = std::fs::read_dir(dir.path().join("dl")).unwrap().collect();
        assert_eq!(downloads.len(), 1);
    }

    #[test]
    fn bad_script_fails() {
        let dir = tempfile::tempdir().unwrap();
        let actions = dir.path().join("bad.txt");
        std::fs::write(&actions, "scribble 1 2\n").unwrap();
        let args = CliArgs {
            background: dir.path().join("missing.png").display().to_string(),
            annotation: None,
            actions: Some(actions),
            save: None,
            download: false,
            download_dir: None,
            target_width: None,
            scale: None,
            config: Some(dir.path().join("none.cfg")),
            verbose: false,
        };
        assert_eq!(run(args), ExitCode::FAILURE);
    }
}
