use std::path::PathBuf;

use clap::Parser;

use captionreel::TimingPolicy;

#[derive(Parser, Debug)]
#[clap(about = "Render narration text as fading captions over its audio track")]
pub struct Args {
    /// Narration audio (WAV or anything ffprobe understands)
    #[clap(long, required_unless_present = "print_config")]
    pub audio: Option<PathBuf>,

    /// Caption text; falls back to --text-file, then stdin
    #[clap(long, conflicts_with = "text_file")]
    pub text: Option<String>,

    #[clap(long)]
    pub text_file: Option<PathBuf>,

    #[clap(long, default_value = "output")]
    pub out_dir: PathBuf,

    #[clap(long, default_value = "./fonts/Arial.ttf")]
    pub font: PathBuf,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    #[clap(long, default_value_t = 5)]
    pub group_size: usize,

    #[clap(long, default_value_t = 0.5)]
    pub fade: f64,

    #[clap(long, value_enum, default_value_t = TimingPolicy::Uniform)]
    pub timing: TimingPolicy,

    #[clap(long, default_value_t = 1280)]
    pub width: u32,

    #[clap(long, default_value_t = 720)]
    pub height: u32,

    #[clap(long, default_value_t = 25)]
    pub fps: u32,

    #[clap(long, default_value = "black")]
    pub background: String,

    #[clap(long, default_value_t = 40)]
    pub font_size: u32,

    #[clap(long, default_value = "white")]
    pub font_color: String,

    /// Leave the encoder's output behind when it fails
    #[clap(long)]
    pub keep_failed: bool,

    /// Print the result as JSON
    #[clap(long)]
    pub json: bool,

    /// Print the effective configuration as JSON and exit
    #[clap(long)]
    pub print_config: bool,
}
