use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimingError {
    #[error("audio duration must be positive and finite, got {0}")]
    InvalidDuration(f64),
    #[error("cannot derive per-word duration from a word count of zero")]
    Division,
    #[error("word count {total_words} is smaller than the {chunk_words} words in the chunks")]
    WordCountMismatch {
        total_words: usize,
        chunk_words: usize,
    },
}

#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("text contains no words to caption")]
    EmptyText,
    #[error("font file not found or unreadable: {}", .0.display())]
    FontMissing(PathBuf),
    #[error(transparent)]
    Timing(#[from] TimingError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frame size must be non-zero and even, got {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("frame rate must be non-zero")]
    FrameRate,
    #[error("group size must be at least one word")]
    GroupSize,
    #[error("fade duration must be finite and non-negative, got {0}")]
    FadeDuration(f64),
    #[error("font file not found or unreadable: {}", .0.display())]
    FontMissing(PathBuf),
}

/// Coarse failure category, stable enough for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AudioProbe,
    GraphBuild,
    Encoding,
    Io,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not probe audio {}: {reason}", path.display())]
    AudioProbe { path: PathBuf, reason: String },

    #[error("could not build filter graph: {0}")]
    GraphBuild(#[from] GraphBuildError),

    #[error("encoder failed ({status}): {}", diagnostics.join(" | "))]
    Encoding {
        status: String,
        diagnostics: Vec<String>,
    },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AudioProbe { .. } => ErrorKind::AudioProbe,
            Self::GraphBuild(_) => ErrorKind::GraphBuild,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when the caller's input (text, audio, font) caused the failure
    /// rather than the renderer or its environment.
    pub fn is_input_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::AudioProbe | ErrorKind::GraphBuild)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AudioProbe {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<TimingError> for RenderError {
    fn from(err: TimingError) -> Self {
        Self::GraphBuild(GraphBuildError::Timing(err))
    }
}
