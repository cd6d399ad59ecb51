mod args;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use captionreel::{CaptionStyle, RenderConfig, Renderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = config_from_args(&args);

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    config.ffmpeg = resolve_binary(&config.ffmpeg)?;
    config.ffprobe = resolve_binary(&config.ffprobe)?;
    info!("Using encoder {} and prober {}", config.ffmpeg.display(), config.ffprobe.display());

    config.validate().context("invalid render configuration")?;
    info!("Font found: {}", config.font_path.display());

    let audio = args.audio.clone().context("--audio is required")?;
    let text = read_text(&args)?;
    info!("Caption text (short preview): {:.200}", text.replace('\n', " "));

    let renderer = Renderer::new(config);
    let cancel = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Interrupt received, cancelling render"),
            Err(e) => {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    match renderer.render_until(&text, &audio, &args.out_dir, cancel).await {
        Ok(output) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", output.path.display());
            }
            info!("Process complete.");
            Ok(())
        }
        Err(e) => {
            if args.json {
                let report = serde_json::json!({
                    "kind": e.kind(),
                    "input_error": e.is_input_error(),
                    "detail": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e).context("render failed")
        }
    }
}

fn config_from_args(args: &Args) -> RenderConfig {
    RenderConfig {
        ffmpeg: args.ffmpeg.clone(),
        ffprobe: args.ffprobe.clone(),
        font_path: args.font.clone(),
        width: args.width,
        height: args.height,
        frame_rate: args.fps,
        background: args.background.clone(),
        group_size: args.group_size,
        fade_duration: args.fade,
        timing: args.timing,
        style: CaptionStyle {
            font_size: args.font_size,
            font_color: args.font_color.clone(),
            ..CaptionStyle::default()
        },
        keep_failed_output: args.keep_failed,
    }
}

fn resolve_binary(name: &Path) -> anyhow::Result<PathBuf> {
    which::which(name).with_context(|| format!("{} not found (is it installed and on PATH?)", name.display()))
}

fn read_text(args: &Args) -> anyhow::Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    if let Some(path) = &args.text_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read text file {}", path.display()));
    }
    info!("Reading caption text from stdin");
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read text from stdin")?;
    Ok(text)
}
