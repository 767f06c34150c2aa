//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Number of non-progress stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 8;

/// One `-i` input with the arguments that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in order; input arguments apply to the most recently added one
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                args: Vec::new(),
                path: input.as_ref().to_path_buf(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add another input file. Subsequent input arguments apply to it.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            path: input.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an input argument (placed before the current input's -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.args.push(arg.into());
        }
        self
    }

    /// Add an output argument (after every -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Read the current input at a fixed frame rate (image sequences).
    pub fn input_frame_rate(self, fps: u32) -> Self {
        self.input_arg("-r").input_arg(fps.to_string())
    }

    /// Treat the current input as an ffmpeg concat list.
    pub fn concat_list(self) -> Self {
        self.input_arg("-f")
            .input_arg("concat")
            .input_arg("-safe")
            .input_arg("0")
    }

    /// Start reading the output at `start` (after input, accurate seek).
    pub fn start_at(self, start: impl Into<String>) -> Self {
        self.output_arg("-ss").output_arg(start)
    }

    /// Stop writing the output at `end`.
    pub fn end_at(self, end: impl Into<String>) -> Self {
        self.output_arg("-to").output_arg(end)
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set JPEG quality scale for image output (2 best, 31 worst).
    pub fn qscale(self, qscale: u8) -> Self {
        self.output_arg("-qscale:v").output_arg(qscale.to_string())
    }

    /// Set audio bitrate in bits per second.
    pub fn audio_bitrate(self, bits_per_second: u32) -> Self {
        self.output_arg("-ab").output_arg(bits_per_second.to_string())
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set output pixel format.
    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Set output frame rate.
    pub fn output_frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Finish encoding when the shortest input ends.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output path of the command.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set an optional timeout.
    pub fn with_optional_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress lines drive the callback; anything else is kept for errors
        let progress_handle = tokio::spawn(async move {
            let mut current_progress = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(progress) = parse_progress_line(&line, &mut current_progress) {
                        progress_callback(progress);
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }

            tail
        });

        let result = self.wait_for_completion(&mut child).await;
        let tail = progress_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => Err(MediaError::ffmpeg_failed(
                format!("{} ({})", message, cmd.output_path().display()),
                (!tail.is_empty()).then(|| tail.join("\n")),
                exit_code,
            )),
            other => other,
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut(u64),
            Cancelled,
        }

        let mut cancel_rx = self.cancel_rx.clone();
        let timeout_secs = self.timeout_secs;

        let outcome = tokio::select! {
            exited = async {
                match timeout_secs {
                    Some(secs) => tokio::time::timeout(Duration::from_secs(secs), child.wait())
                        .await
                        .map_or(Outcome::TimedOut(secs), Outcome::Exited),
                    None => Outcome::Exited(child.wait().await),
                }
            } => exited,
            _ = wait_for_cancel(cancel_rx.as_mut()) => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status?,
            Outcome::TimedOut(secs) => {
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                return Err(MediaError::Timeout(secs));
            }
            Outcome::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Resolve once the cancel flag turns true; never resolves without a receiver.
async fn wait_for_cancel(rx: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };

    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling
            return std::future::pending().await;
        }
    }
}

/// Whether a stderr line belongs to the `-progress` key=value stream.
fn is_progress_line(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => !key.is_empty() && !key.contains(char::is_whitespace),
        None => false,
    }
}

/// Parse a progress line from FFmpeg's -progress output.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys carry microseconds in current ffmpeg releases
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "out_time" => current.out_time = value.to_string(),
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("frames/%05d.jpg", "video.mp4")
            .input_frame_rate(12)
            .add_input("audio.mp3")
            .video_codec("libx264")
            .crf(23)
            .shortest();

        let args = cmd.build_args();
        let first_input = args.iter().position(|a| a == "frames/%05d.jpg").unwrap();
        let rate = args.iter().position(|a| a == "-r").unwrap();
        let second_input = args.iter().position(|a| a == "audio.mp3").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();

        assert!(rate < first_input);
        assert!(first_input < second_input);
        assert!(second_input < codec);
        assert_eq!(args.last().unwrap(), "video.mp4");
        assert_eq!(&args[..2], &["-y".to_string(), "-v".to_string()]);
    }

    #[test]
    fn test_concat_list_args() {
        let args = FfmpegCommand::new("list.txt", "out.mp4")
            .concat_list()
            .codec_copy()
            .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i list.txt -c copy out.mp4"));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        parse_progress_line("out_time_us=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
    }

    #[test]
    fn test_progress_block_yields_one_update() {
        let mut progress = FfmpegProgress::default();
        let block = ["frame=24", "fps=48.0", "out_time=00:00:02.000000", "progress=continue"];

        let updates: Vec<FfmpegProgress> = block
            .iter()
            .filter(|line| is_progress_line(line))
            .filter_map(|line| parse_progress_line(line, &mut progress))
            .collect();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].frame, 24);
        assert_eq!(updates[0].out_time, "00:00:02.000000");
        assert!(!updates[0].is_complete);
    }

    #[tokio::test]
    async fn test_wait_for_cancel_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_cancel(Some(&mut rx)).await });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_cancel_pending_without_signal() {
        let pending = tokio::time::timeout(Duration::from_millis(20), wait_for_cancel(None)).await;
        assert!(pending.is_err());

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let dropped =
            tokio::time::timeout(Duration::from_millis(20), wait_for_cancel(Some(&mut rx))).await;
        assert!(dropped.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_runner_stops_ffmpeg() {
        if check_ffmpeg().is_err() {
            return;
        }
        let temp = tempfile::TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let cmd = FfmpegCommand::new("anullsrc", temp.path().join("out.mp3"))
            .input_arg("-re")
            .input_arg("-f")
            .input_arg("lavfi")
            .output_args(["-t", "60"]);
        let result = FfmpegRunner::new().with_cancel(rx).run(&cmd).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("frame=12"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("Error opening input file in.mp4."));
        assert!(!is_progress_line("[mp3 @ 0x55] Invalid data found, skip=3"));
    }
}
