use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the audio duration is shared out between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TimingPolicy {
    /// Per-word duration times group size for every chunk; the last chunk is
    /// clamped so it ends with the audio.
    #[default]
    Uniform,
    /// Every chunk gets the same share regardless of its word count.
    Even,
    /// Shares weighted by word length (sum of chars^0.75 per chunk).
    Characters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub font_color: String,
    pub box_color: String,
    pub box_border: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 40,
            font_color: "white".to_string(),
            box_color: "black@0.5".to_string(),
            box_border: 5,
        }
    }
}

/// Everything a `Renderer` needs besides the per-render inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub font_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub background: String,
    pub group_size: usize,
    pub fade_duration: f64,
    pub timing: TimingPolicy,
    pub style: CaptionStyle,
    /// Leave the encoder's output behind when it fails, for inspection.
    pub keep_failed_output: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            font_path: PathBuf::from("fonts/Arial.ttf"),
            width: 1280,
            height: 720,
            frame_rate: 25,
            background: "black".to_string(),
            group_size: 5,
            fade_duration: 0.5,
            timing: TimingPolicy::default(),
            style: CaptionStyle::default(),
            keep_failed_output: false,
        }
    }
}

impl RenderConfig {
    pub fn with_font(mut self, font_path: impl Into<PathBuf>) -> Self {
        self.font_path = font_path.into();
        self
    }

    /// Startup precondition check. The font is re-checked on every render.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            // yuv420p needs even dimensions
            return Err(ConfigError::FrameSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::FrameRate);
        }
        if self.group_size == 0 {
            return Err(ConfigError::GroupSize);
        }
        if !self.fade_duration.is_finite() || self.fade_duration < 0.0 {
            return Err(ConfigError::FadeDuration(self.fade_duration));
        }
        if !font_is_readable(&self.font_path) {
            return Err(ConfigError::FontMissing(self.font_path.clone()));
        }
        Ok(())
    }
}

pub fn font_is_readable(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}
