//! Runs the stages selected on the command line, in pipeline order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use lipcut_media::face::{FaceClassifier, FaceEngine, OrtFaceEngine};
use lipcut_media::{check_ffmpeg, check_ytdlp, FfmpegRunner, MediaError};

use crate::adjust::{adjust_images, adjust_sets_of_images};
use crate::analyze::{
    analyze_images, analyze_sets_of_images, model_path_for_examples, train_model, Recognizer,
};
use crate::cli::{Cli, ModelSource, SetTarget};
use crate::compile::{compile_single, compile_videos, stitch_all_videos};
use crate::config::PipelineConfig;
use crate::convert::convert_directory;
use crate::download::{download_videos, read_url_list};
use crate::error::PipelineResult;

/// Face engine shared between blocking stage tasks.
pub type SharedEngine = Arc<dyn FaceEngine>;

/// Runs stages with one configuration and a lazily loaded face engine.
pub struct PipelineRunner {
    config: PipelineConfig,
    engine: Option<SharedEngine>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            engine: None,
            cancel_rx: None,
        }
    }

    /// Stop running ffmpeg commands once `cancel_rx` turns true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Use `engine` instead of loading the ONNX models.
    pub fn with_engine(mut self, engine: SharedEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        match &self.cancel_rx {
            Some(rx) if *rx.borrow() => Err(MediaError::Cancelled.into()),
            _ => Ok(()),
        }
    }

    fn ffmpeg_runner(&self) -> FfmpegRunner {
        let runner = self.ffmpeg_runner();
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }

    fn engine(&mut self) -> PipelineResult<SharedEngine> {
        if let Some(engine) = &self.engine {
            return Ok(Arc::clone(engine));
        }
        let paths = self.config.model_paths();
        info!(model_dir = %self.config.model_dir.display(), "Loading face models");
        let engine: SharedEngine = Arc::new(OrtFaceEngine::load(
            &paths,
            self.config.detection_threshold,
        )?);
        self.engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Run every stage `cli` selects. The first failing stage stops the run,
    /// and so does cancellation, which is checked before each stage.
    pub async fn run(&mut self, cli: &Cli) -> PipelineResult<()> {
        let cli = cli.with_absolute_paths()?;
        if let Some(url_file) = &cli.video_url_file {
            self.check_cancelled()?;
            self.download(url_file.clone(), cli.quality).await?;
        }
        if let Some(video_dir) = &cli.video_directory {
            self.check_cancelled()?;
            self.convert(video_dir.clone(), cli.fps, cli.qscale).await?;
        }
        if let Some(source) = cli.model_source() {
            self.check_cancelled()?;
            self.analyze(source, cli.analyze_target(), cli.new_analysis)
                .await?;
        }
        if let (Some(target), Some(name)) = (cli.adjust_target(), &cli.name) {
            self.check_cancelled()?;
            self.adjust(target, name.clone(), cli.clear_adjustments)
                .await?;
        }
        if let Some(reference_dir) = &cli.reference_directory {
            self.check_cancelled()?;
            self.compile(
                reference_dir.clone(),
                cli.source_video_directory.clone(),
                cli.reference_fps,
                cli.stitch,
            )
            .await?;
        }
        Ok(())
    }

    pub async fn download(&self, url_file: PathBuf, quality: u32) -> PipelineResult<()> {
        check_ytdlp()?;
        let urls = read_url_list(&url_file)?;
        download_videos(&url_file, &urls, quality).await?;
        Ok(())
    }

    pub async fn convert(&self, video_dir: PathBuf, fps: u32, qscale: u8) -> PipelineResult<()> {
        check_ffmpeg()?;
        convert_directory(&self.ffmpeg_runner(), &video_dir, fps, qscale).await?;
        Ok(())
    }

    /// Train or load the classifier, then analyze `target` if given.
    pub async fn analyze(
        &mut self,
        source: ModelSource,
        target: Option<SetTarget>,
        clear: bool,
    ) -> PipelineResult<()> {
        let engine = self.engine()?;
        let threshold = self.config.match_threshold;

        tokio::task::spawn_blocking(move || -> PipelineResult<()> {
            let classifier = match source {
                ModelSource::Train(examples) => {
                    let save_path = model_path_for_examples(&examples);
                    train_model(engine.as_ref(), &examples, &save_path)?
                }
                ModelSource::Load(path) => FaceClassifier::load(&path)?,
            };

            let recognizer = Recognizer {
                engine: engine.as_ref(),
                classifier: &classifier,
                match_threshold: threshold,
            };
            match target {
                Some(SetTarget::Single(dir)) => {
                    analyze_images(&recognizer, &dir, clear)?;
                }
                Some(SetTarget::All(dir)) => {
                    analyze_sets_of_images(&recognizer, &dir, clear)?;
                }
                None => {}
            }
            Ok(())
        })
        .await?
    }

    pub async fn adjust(&mut self, target: SetTarget, name: String, clear: bool) -> PipelineResult<()> {
        let engine = self.engine()?;
        let min_face_size = self.config.min_face_size;

        tokio::task::spawn_blocking(move || -> PipelineResult<()> {
            match target {
                SetTarget::Single(dir) => {
                    adjust_images(engine.as_ref(), &dir, &name, clear, min_face_size)?;
                }
                SetTarget::All(dir) => {
                    adjust_sets_of_images(engine.as_ref(), &dir, &name, clear, min_face_size)?;
                }
            }
            Ok(())
        })
        .await?
    }

    /// Compile one set or all of them, then stitch if asked.
    pub async fn compile(
        &self,
        reference_dir: PathBuf,
        source_dir: Option<PathBuf>,
        fps: u32,
        stitch: bool,
    ) -> PipelineResult<()> {
        check_ffmpeg()?;
        let runner = self.ffmpeg_runner();
        let seed = self.config.match_seed;

        match source_dir {
            Some(source_dir) => {
                compile_single(&runner, &source_dir, &reference_dir, fps, seed).await?;
            }
            None => {
                compile_videos(&runner, &reference_dir, fps, seed).await?;
            }
        }

        if stitch {
            stitch_all_videos(&runner, &reference_dir).await?;
        }
        Ok(())
    }
}
