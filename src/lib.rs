//! Renders narration text as timed, fading caption overlays on a plain
//! background, muxed with the narration audio into a single MP4.

pub mod audio;
pub mod config;
pub mod error;
pub mod filter;
pub mod render;
pub mod segment;
pub mod timing;

pub use config::{CaptionStyle, RenderConfig, TimingPolicy};
pub use error::{ErrorKind, GraphBuildError, RenderError, TimingError};
pub use render::{RenderOutput, RenderResult, RenderStage, Renderer};
