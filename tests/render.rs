#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use captionreel::{ErrorKind, GraphBuildError, RenderConfig, RenderError, Renderer};
use serial_test::serial;
use tempfile::TempDir;

const FIVE_WORDS: &str = "hello world test render video";
/// Every character the graph or option parser treats as structure.
const HOSTILE: &str = "it's 5:00 \\ \"q\", [x]; end' a=b 100%";

struct Fixture {
    dir: TempDir,
    config: RenderConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Arial.ttf");
        std::fs::write(&font, b"font bytes").unwrap();
        let config = RenderConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
            ..RenderConfig::default().with_font(font)
        };
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn out_dir(&self) -> PathBuf {
        self.path("out")
    }

    /// Installs a shell script as the encoder. `$out` is the output path.
    fn encoder(mut self, body: &str) -> Self {
        let script = format!("#!/bin/sh\nfor out; do :; done\n{body}\n");
        self.config.ffmpeg = write_script(&self.path("ffmpeg"), &script);
        self
    }

    fn prober(mut self, body: &str) -> Self {
        let script = format!("#!/bin/sh\n{body}\n");
        self.config.ffprobe = write_script(&self.path("ffprobe"), &script);
        self
    }

    fn wav(&self, name: &str, seconds: f64) -> PathBuf {
        let path = self.path(name);
        write_wav(&path, seconds);
        path
    }

    fn renderer(&self) -> Renderer {
        Renderer::new(self.config.clone())
    }
}

fn write_script(path: &Path, contents: &str) -> PathBuf {
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

fn write_wav(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (8000.0 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / 8000.0;
        let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.2 * i16::MAX as f32;
        writer.write_sample(sample as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
#[serial]
async fn missing_audio_is_a_probe_error_and_writes_nothing() {
    let fx = Fixture::new().encoder("echo video > \"$out\"");
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &fx.path("missing.wav"), &fx.out_dir())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AudioProbe);
    assert!(err.is_input_error());
    assert!(files_in(&fx.out_dir()).is_empty());
}

#[tokio::test]
#[serial]
async fn successful_render_returns_the_written_file() {
    let fx = Fixture::new().encoder("echo video > \"$out\"");
    let audio = fx.wav("narration.wav", 5.0);
    let output = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap();
    assert!(output.path.starts_with(fx.out_dir()));
    assert!(output.path.is_file());
    assert_eq!(output.segments, 1);
    assert!((output.duration_secs - 5.0).abs() < 1e-6);
}

#[tokio::test]
#[serial]
async fn concurrent_renders_get_distinct_outputs() {
    let fx = Fixture::new().encoder("echo video > \"$out\"");
    let audio = fx.wav("narration.wav", 2.0);
    let renderer = fx.renderer();
    let out = fx.out_dir();
    let (a, b) = tokio::join!(
        renderer.render(FIVE_WORDS, &audio, &out),
        renderer.render("another caption entirely", &audio, &out),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.path, b.path);
    assert_eq!(files_in(&out).len(), 2);
}

#[tokio::test]
#[serial]
async fn encoder_receives_graph_audio_and_duration() {
    let fx = Fixture::new();
    let log = fx.path("args.txt");
    let fx = fx.encoder(&format!(
        "printf '%s\\n' \"$@\" > '{}'\necho video > \"$out\"",
        log.display()
    ));
    let audio = fx.wav("narration.wav", 10.0);
    let text = "w1 w2 w3 w4 w5 w6 w7 w8 w9 w10 w11";
    fx.renderer().render(text, &audio, &fx.out_dir()).await.unwrap();

    let args: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
    assert!(graph.starts_with("[0:v]drawtext="));
    assert!(graph.ends_with("[captioned]"));
    assert_eq!(graph.matches("drawtext=").count(), 3);
    assert!(args.contains(&audio.display().to_string()));
    assert!(args.contains(&"color=c=black:s=1280x720:r=25:d=10.000000".to_string()));
    let t = args.iter().position(|a| a == "-t").unwrap();
    assert_eq!(args[t + 1], "10.000000");
}

#[tokio::test]
#[serial]
async fn encoder_failure_removes_partial_output() {
    let fx = Fixture::new().encoder("echo partial > \"$out\"\necho 'Invalid filter graph' >&2\nexit 1");
    let audio = fx.wav("narration.wav", 3.0);
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap_err();
    match &err {
        RenderError::Encoding { diagnostics, .. } => {
            assert_eq!(diagnostics, &vec!["Invalid filter graph".to_string()]);
        }
        other => panic!("expected encoding error, got {other:?}"),
    }
    assert!(!err.is_input_error());
    assert!(files_in(&fx.out_dir()).is_empty());
}

#[tokio::test]
#[serial]
async fn failed_output_can_be_kept_for_inspection() {
    let mut fx = Fixture::new().encoder("echo partial > \"$out\"\nexit 2");
    fx.config.keep_failed_output = true;
    let audio = fx.wav("narration.wav", 3.0);
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert_eq!(files_in(&fx.out_dir()).len(), 1);
}

#[tokio::test]
#[serial]
async fn clean_exit_without_output_is_an_encoding_error() {
    let fx = Fixture::new().encoder("exit 0");
    let audio = fx.wav("narration.wav", 3.0);
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
}

#[tokio::test]
#[serial]
async fn empty_text_fails_before_the_encoder_starts() {
    let fx = Fixture::new();
    let marker = fx.path("spawned");
    let fx = fx.encoder(&format!("touch '{}'\necho video > \"$out\"", marker.display()));
    let audio = fx.wav("narration.wav", 3.0);
    let err = fx
        .renderer()
        .render("  \n\t ", &audio, &fx.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::GraphBuild(GraphBuildError::EmptyText)));
    assert!(!marker.exists());
    assert!(files_in(&fx.out_dir()).is_empty());
}

#[tokio::test]
#[serial]
async fn missing_font_is_reported_as_graph_build_failure() {
    let mut fx = Fixture::new().encoder("echo video > \"$out\"");
    fx.config.font_path = fx.path("gone.ttf");
    let audio = fx.wav("narration.wav", 3.0);
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::GraphBuild(GraphBuildError::FontMissing(_))));
}

#[tokio::test]
#[serial]
async fn non_wav_audio_is_probed_with_ffprobe() {
    let fx = Fixture::new()
        .encoder("echo video > \"$out\"")
        .prober("echo 7.25");
    let audio = fx.path("narration.mp3");
    std::fs::write(&audio, b"ID3 not really mp3").unwrap();
    let output = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap();
    assert!((output.duration_secs - 7.25).abs() < 1e-9);
}

#[tokio::test]
#[serial]
async fn prober_failure_is_a_probe_error() {
    let fx = Fixture::new()
        .encoder("echo video > \"$out\"")
        .prober("echo 'Invalid data found' >&2\nexit 1");
    let audio = fx.path("narration.ogg");
    std::fs::write(&audio, b"garbage").unwrap();
    let err = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AudioProbe);
    assert!(err.to_string().contains("Invalid data found"));
}

#[tokio::test]
#[serial]
async fn cancellation_kills_encoder_and_cleans_up() {
    let fx = Fixture::new().encoder("echo partial > \"$out\"\nexec sleep 30");
    let audio = fx.wav("narration.wav", 3.0);
    let started = std::time::Instant::now();
    let err = fx
        .renderer()
        .render_until(
            FIVE_WORDS,
            &audio,
            &fx.out_dir(),
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(files_in(&fx.out_dir()).is_empty());
}

/// Runs against the real encoder when ffmpeg, ffprobe and a font are installed.
#[tokio::test]
#[serial]
async fn renders_real_video_matching_audio_duration() {
    let (Ok(ffmpeg), Ok(ffprobe)) = (which::which("ffmpeg"), which::which("ffprobe")) else {
        eprintln!("ffmpeg/ffprobe not on PATH; skipping");
        return;
    };
    let listing = |flag: &str| {
        std::process::Command::new(&ffmpeg)
            .args(["-hide_banner", flag])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
            .unwrap_or_default()
    };
    if !listing("-filters").contains("drawtext") || !listing("-encoders").contains("libx264") {
        eprintln!("ffmpeg lacks drawtext or libx264; skipping");
        return;
    }
    let Some(font) = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/Library/Fonts/Arial.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.is_file()) else {
        eprintln!("no usable font found; skipping");
        return;
    };

    let mut fx = Fixture::new();
    fx.config.ffmpeg = ffmpeg;
    fx.config.ffprobe = ffprobe.clone();
    fx.config.font_path = font;
    let audio = fx.wav("narration.wav", 5.0);

    let output = fx
        .renderer()
        .render(FIVE_WORDS, &audio, &fx.out_dir())
        .await
        .unwrap();
    assert_eq!(output.segments, 1);

    let probed = std::process::Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(&output.path)
        .output()
        .unwrap();
    let duration: f64 = String::from_utf8_lossy(&probed.stdout).trim().parse().unwrap();
    assert!((duration - 5.0).abs() < 0.05, "video lasted {duration}s");

    let hostile = fx
        .renderer()
        .render(HOSTILE, &audio, &fx.out_dir())
        .await
        .unwrap();
    assert_eq!(hostile.segments, 2);
    assert!(std::fs::metadata(&hostile.path).unwrap().len() > 0);
}
