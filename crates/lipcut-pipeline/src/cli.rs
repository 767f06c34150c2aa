//! Command-line interface.
//!
//! There are no subcommands: each stage runs when its main flag is given,
//! and stages always run in pipeline order.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};

use lipcut_media::download::DEFAULT_QUALITY;
use lipcut_media::extract::{DEFAULT_FPS, DEFAULT_QSCALE};

#[derive(Debug, Clone, Parser)]
#[command(name = "lipcut")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("recognizer").args(["model", "examples"])))]
#[command(group(ArgGroup::new("analyze_target").args(["images", "sets_of_images"])))]
#[command(group(ArgGroup::new("adjust_target").args(["adjustments", "sets_of_adjustments"])))]
pub struct Cli {
    /// Text file with one video URL per line
    #[arg(long, value_name = "FILE")]
    pub video_url_file: Option<PathBuf>,

    /// Maximum video height to download
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    pub quality: u32,

    /// Directory of videos to split into frames and audio
    #[arg(long, value_name = "DIR")]
    pub video_directory: Option<PathBuf>,

    /// Frames extracted per second
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..))]
    pub fps: u32,

    /// JPEG quality of extracted frames, 2 (best) to 31
    #[arg(long, default_value_t = DEFAULT_QSCALE, value_parser = clap::value_parser!(u8).range(2..=31))]
    pub qscale: u8,

    /// Directory of per-person example folders to train a model from
    #[arg(long, value_name = "DIR")]
    pub examples: Option<PathBuf>,

    /// Pre-trained model file
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Image set to analyze (a directory with `frames/`)
    #[arg(long, value_name = "DIR", requires = "recognizer")]
    pub images: Option<PathBuf>,

    /// Directory of image sets to analyze
    #[arg(long, value_name = "DIR", requires = "recognizer")]
    pub sets_of_images: Option<PathBuf>,

    /// Clear previous analysis and start over
    #[arg(short = 'n')]
    pub new_analysis: bool,

    /// Performer to adjust frames for (an example folder name)
    #[arg(long)]
    pub name: Option<String>,

    /// Image set to adjust
    #[arg(long, value_name = "DIR", requires = "name")]
    pub adjustments: Option<PathBuf>,

    /// Directory of image sets to adjust
    #[arg(long, value_name = "DIR", requires = "name")]
    pub sets_of_adjustments: Option<PathBuf>,

    /// Remove existing adjusted frames first
    #[arg(short = 'c')]
    pub clear_adjustments: bool,

    /// Directory of image sets with adjusted frames and audio
    #[arg(long, value_name = "DIR")]
    pub reference_directory: Option<PathBuf>,

    /// Compile only this image set
    #[arg(long, value_name = "DIR", requires = "reference_directory")]
    pub source_video_directory: Option<PathBuf>,

    /// Frame rate the reference frames were extracted at
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..))]
    pub reference_fps: u32,

    /// Stitch every compiled video into one
    #[arg(short = 's', requires = "reference_directory")]
    pub stitch: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Where an analyze or adjust stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTarget {
    Single(PathBuf),
    All(PathBuf),
}

/// How the face classifier is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Train(PathBuf),
    Load(PathBuf),
}

impl Cli {
    /// Parse arguments and exit with a usage error when no stage is selected.
    pub fn parse_args() -> Self {
        let cli = Self::parse();
        if let Err(e) = cli.require_stage() {
            e.exit();
        }
        cli
    }

    /// Usage error unless at least one stage flag is present.
    pub fn require_stage(&self) -> Result<(), clap::Error> {
        if self.has_stage() {
            return Ok(());
        }
        Err(Self::command().error(
            ErrorKind::MissingRequiredArgument,
            "nothing to do: give at least one of --video-url-file, --video-directory, \
             --examples/--model, --adjustments/--sets-of-adjustments or --reference-directory",
        ))
    }

    pub fn has_stage(&self) -> bool {
        self.video_url_file.is_some()
            || self.video_directory.is_some()
            || self.model_source().is_some()
            || self.adjust_target().is_some()
            || self.reference_directory.is_some()
    }

    pub fn model_source(&self) -> Option<ModelSource> {
        match (&self.examples, &self.model) {
            (Some(examples), _) => Some(ModelSource::Train(examples.clone())),
            (None, Some(model)) => Some(ModelSource::Load(model.clone())),
            (None, None) => None,
        }
    }

    pub fn analyze_target(&self) -> Option<SetTarget> {
        set_target(&self.images, &self.sets_of_images)
    }

    pub fn adjust_target(&self) -> Option<SetTarget> {
        set_target(&self.adjustments, &self.sets_of_adjustments)
    }

    /// Copy of the arguments with every path made absolute against the
    /// current directory. Later stages hand these paths to ffmpeg, which
    /// resolves list entries relative to the list file.
    pub fn with_absolute_paths(&self) -> std::io::Result<Self> {
        let mut cli = self.clone();
        for path in [
            &mut cli.video_url_file,
            &mut cli.video_directory,
            &mut cli.examples,
            &mut cli.model,
            &mut cli.images,
            &mut cli.sets_of_images,
            &mut cli.adjustments,
            &mut cli.sets_of_adjustments,
            &mut cli.reference_directory,
            &mut cli.source_video_directory,
        ]
        .into_iter()
        .flatten()
        {
            *path = std::path::absolute(&*path)?;
        }
        Ok(cli)
    }

    /// Default log level for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn set_target(single: &Option<PathBuf>, all: &Option<PathBuf>) -> Option<SetTarget> {
    match (single, all) {
        (Some(dir), _) => Some(SetTarget::Single(dir.clone())),
        (None, Some(dir)) => Some(SetTarget::All(dir.clone())),
        (None, None) => None,
    }
}
