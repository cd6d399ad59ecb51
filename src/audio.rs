use std::path::Path;
use std::process::Stdio;

use hound::WavReader;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RenderError;

/// Reads the duration from the WAV header without decoding samples.
pub fn wav_duration_seconds(path: &Path) -> Result<f64, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Duration of `path` in seconds. WAV headers are read directly; anything
/// else (or a WAV header hound rejects) is handed to `ffprobe`.
pub async fn probe_duration(ffprobe: &Path, path: &Path) -> Result<f64, RenderError> {
    if !path.is_file() {
        return Err(RenderError::probe(path, "audio file does not exist"));
    }

    if is_wav(path) {
        match wav_duration_seconds(path) {
            Ok(duration) => {
                debug!("WAV header reports {:.3}s for {}", duration, path.display());
                return Ok(duration);
            }
            Err(e) => warn!("Could not read WAV header of {} ({}); falling back to ffprobe", path.display(), e),
        }
    }

    ffprobe_duration(ffprobe, path).await
}

async fn ffprobe_duration(ffprobe: &Path, path: &Path) -> Result<f64, RenderError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RenderError::probe(path, format!("failed to run {}: {e}", ffprobe.display())))?;

    if !output.status.success() {
        return Err(RenderError::probe(
            path,
            format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout)
        .ok_or_else(|| RenderError::probe(path, format!("no usable duration in ffprobe output {:?}", stdout.trim())))
}

fn parse_duration(raw: &str) -> Option<f64> {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}
