//! Render driver: probe the narration, build the caption graph and run the
//! encoder to completion, failure or cancellation.
//!
//! A render moves through `Idle → ProbingAudio → BuildingGraph → Encoding`
//! and ends in `Succeeded` or `Failed`. There are no retries here.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::probe_duration;
use crate::config::{RenderConfig, font_is_readable};
use crate::error::{GraphBuildError, RenderError};
use crate::filter::{build_filter_graph, escape_value};
use crate::segment::{segment, word_count};
use crate::timing::allocate;

/// Encoder stderr lines kept for the failure report.
const DIAGNOSTIC_TAIL: usize = 20;

static PROGRESS_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^out_time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").expect("progress regex is valid")
});
static PROGRESS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+=").expect("progress key regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Idle,
    ProbingAudio,
    BuildingGraph,
    Encoding,
    Succeeded,
    Failed,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ProbingAudio => "probing audio",
            Self::BuildingGraph => "building graph",
            Self::Encoding => "encoding",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub segments: usize,
}

pub type RenderResult = Result<RenderOutput, RenderError>;

/// The filter graph and the numbers the encoder invocation needs.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub graph: String,
    pub duration: f64,
    pub segments: usize,
}

pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub async fn render(&self, text: &str, audio_path: &Path, output_dir: &Path) -> RenderResult {
        self.render_until(text, audio_path, output_dir, std::future::pending())
            .await
    }

    /// Like [`Renderer::render`], but gives up as soon as `cancel` resolves.
    /// The encoder is killed and its partial output removed.
    pub async fn render_until<F>(
        &self,
        text: &str,
        audio_path: &Path,
        output_dir: &Path,
        cancel: F,
    ) -> RenderResult
    where
        F: Future<Output = ()>,
    {
        let mut stage = StageLog::default();
        let result = tokio::select! {
            result = self.run(&mut stage, text, audio_path, output_dir) => result,
            _ = cancel => Err(RenderError::Cancelled),
        };
        if matches!(result, Err(RenderError::Cancelled)) {
            warn!("Render cancelled while {}", stage.current);
        }

        match &result {
            Ok(output) => {
                stage.enter(RenderStage::Succeeded);
                info!("Video written to {}", output.path.display());
            }
            Err(e) => {
                stage.enter(RenderStage::Failed);
                error!("Render failed ({:?}): {}", e.kind(), e);
            }
        }
        result
    }

    async fn run(
        &self,
        stage: &mut StageLog,
        text: &str,
        audio_path: &Path,
        output_dir: &Path,
    ) -> RenderResult {
        if !font_is_readable(&self.config.font_path) {
            return Err(GraphBuildError::FontMissing(self.config.font_path.clone()).into());
        }

        stage.enter(RenderStage::ProbingAudio);
        let duration = probe_duration(&self.config.ffprobe, audio_path).await?;
        info!("Audio duration: {:.3} seconds", duration);

        stage.enter(RenderStage::BuildingGraph);
        let plan = self.plan(text, duration)?;
        debug!("Filter graph: {}", plan.graph);

        stage.enter(RenderStage::Encoding);
        self.encode(&plan, audio_path, output_dir).await
    }

    /// Segments, times and escapes `text` into a filter graph. Pure apart
    /// from the font check, so it can be exercised without an encoder.
    pub fn plan(&self, text: &str, duration: f64) -> Result<GraphPlan, GraphBuildError> {
        let cfg = &self.config;
        if !font_is_readable(&cfg.font_path) {
            return Err(GraphBuildError::FontMissing(cfg.font_path.clone()));
        }

        let chunks = segment(text, cfg.group_size);
        if chunks.is_empty() {
            return Err(GraphBuildError::EmptyText);
        }
        info!("Split text into {} chunks of up to {} words", chunks.len(), cfg.group_size);

        let segments = allocate(&chunks, word_count(text), duration, cfg.timing)?;
        for seg in &segments {
            debug!(
                "Chunk {}: {:.3}s -> {:.3}s \"{}\"",
                seg.chunk.index, seg.start, seg.end, seg.chunk.text
            );
        }

        Ok(GraphPlan {
            graph: build_filter_graph(&segments, &cfg.font_path, &cfg.style, cfg.fade_duration),
            duration,
            segments: segments.len(),
        })
    }

    async fn encode(&self, plan: &GraphPlan, audio_path: &Path, output_dir: &Path) -> RenderResult {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| RenderError::io(output_dir, e))?;

        let guard = OutputGuard::new(allocate_output_path(output_dir));
        let args = encoder_args(&self.config, plan, audio_path, guard.path());
        debug!(
            "Spawning {} with args: {}",
            self.config.ffmpeg.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let mut child = Command::new(&self.config.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Encoding {
                status: format!("failed to spawn {}: {e}", self.config.ffmpeg.display()),
                diagnostics: Vec::new(),
            })?;

        let stderr = child.stderr.take();
        let total = plan.duration;
        let diagnostics = async move {
            match stderr {
                Some(stderr) => collect_diagnostics(stderr, total).await,
                None => Vec::new(),
            }
        };

        let (status, diagnostics) = tokio::join!(child.wait(), diagnostics);
        let status = status.map_err(|e| RenderError::Encoding {
            status: format!("failed to wait for encoder: {e}"),
            diagnostics: diagnostics.clone(),
        })?;

        if !status.success() {
            if self.config.keep_failed_output {
                let kept = guard.disarm();
                warn!("Keeping failed output for inspection: {}", kept.display());
            }
            return Err(RenderError::Encoding {
                status: status.to_string(),
                diagnostics,
            });
        }

        let produced = tokio::fs::metadata(guard.path())
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(RenderError::Encoding {
                status: status.to_string(),
                diagnostics: vec!["encoder exited cleanly but wrote no output".to_string()],
            });
        }

        Ok(RenderOutput {
            path: guard.disarm(),
            duration_secs: plan.duration,
            segments: plan.segments,
        })
    }
}

/// Encoder arguments. The output path is always the last argument.
pub fn encoder_args(cfg: &RenderConfig, plan: &GraphPlan, audio_path: &Path, output: &Path) -> Vec<OsString> {
    let duration = format!("{:.6}", plan.duration);
    let source = format!(
        "color=c={}:s={}x{}:r={}:d={}",
        escape_value(&cfg.background),
        cfg.width,
        cfg.height,
        cfg.frame_rate,
        duration
    );
    let filter = format!("[0:v]{}[captioned]", plan.graph);

    let mut args: Vec<OsString> = [
        "-y", "-hide_banner", "-nostdin", "-loglevel", "error", "-nostats", "-progress", "pipe:2",
        "-f", "lavfi", "-i",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(source.into());
    args.push("-i".into());
    args.push(audio_path.as_os_str().to_owned());
    args.extend(
        [
            "-filter_complex",
            filter.as_str(),
            "-map",
            "[captioned]",
            "-map",
            "1:a:0",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-movflags",
            "+faststart",
            "-t",
            duration.as_str(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

/// Timestamp plus a random id, so renders started in the same instant
/// still get distinct files.
pub fn allocate_output_path(output_dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    output_dir.join(format!("output_{}_{}.mp4", stamp, Uuid::new_v4().simple()))
}

/// Reads encoder stderr to the end, logging progress and keeping the last
/// few non-progress lines.
async fn collect_diagnostics<R>(stderr: R, total: f64) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if let Some(secs) = progress_seconds(&line) {
                    debug!("Encoded {:.1}s of {:.1}s", secs, total);
                } else if !line.is_empty() && !PROGRESS_LINE.is_match(&line) {
                    if tail.len() == DIAGNOSTIC_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading encoder output: {}", e);
                break;
            }
        }
    }
    tail.into()
}

fn progress_seconds(line: &str) -> Option<f64> {
    let caps = PROGRESS_TIME.captures(line)?;
    let h: f64 = caps[1].parse().ok()?;
    let m: f64 = caps[2].parse().ok()?;
    let s: f64 = caps[3].parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

#[derive(Debug)]
struct StageLog {
    current: RenderStage,
}

impl Default for StageLog {
    fn default() -> Self {
        Self {
            current: RenderStage::Idle,
        }
    }
}

impl StageLog {
    fn enter(&mut self, next: RenderStage) {
        info!("Render stage: {} -> {}", self.current, next);
        self.current = next;
    }
}

/// Removes the output file on drop unless disarmed. Covers encoder failure,
/// cancellation and the render future being dropped mid-encode.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed || !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial output {}", self.path.display()),
            Err(e) => warn!("Could not remove partial output {}: {}", self.path.display(), e),
        }
    }
}
