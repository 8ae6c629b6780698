mod cli;

use livedash::ingest::{interleave, AdtsReader, AnnexBReader};
use livedash::{worker, ControlRequest, Packager};
use livedash_common::{CodecFamily, DashConfig, Frame, TrackId, TrackSpec};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

/// Frames sent to the packager worker per batch.
const BATCH_SIZE: usize = 32;

/// Queued batches before the reader waits on the packager.
const QUEUE_DEPTH: usize = 8;

struct PackageArgs {
    audio: Option<PathBuf>,
    video: Option<PathBuf>,
    codec: CodecFamily,
    width: u32,
    height: u32,
    fps: u32,
    bitrate: Option<u64>,
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "livedash=trace,livedash_media=trace,livedash_common=debug".to_string()
        } else {
            "livedash=info,livedash_media=info,livedash_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Package {
            audio,
            video,
            codec,
            width,
            height,
            fps,
            bitrate,
            output,
        } => {
            let codec = match codec.as_str() {
                "h265" => CodecFamily::Hevc,
                _ => CodecFamily::Avc,
            };
            let args = PackageArgs {
                audio,
                video,
                codec,
                width,
                height,
                fps,
                bitrate,
                output,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(package(args, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("livedash {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DashConfig> {
    match path {
        Some(p) => DashConfig::load(p).with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(DashConfig::default()),
    }
}

async fn package(args: PackageArgs, config_path: Option<&Path>) -> Result<()> {
    if args.audio.is_none() && args.video.is_none() {
        anyhow::bail!("Nothing to package: pass --audio and/or --video");
    }

    let mut config = load_config(config_path)?;
    if let Some(output) = args.output {
        config.folder = output;
    }

    let video = args
        .video
        .as_deref()
        .map(|p| {
            AnnexBReader::open(p, args.codec, args.fps)
                .with_context(|| format!("Failed to read video input {}", p.display()))
        })
        .transpose()?;
    let audio = args
        .audio
        .as_deref()
        .map(|p| AdtsReader::open(p).with_context(|| format!("Failed to read audio input {}", p.display())))
        .transpose()?;

    let (handle, join) = worker::spawn(Packager::new(), QUEUE_DEPTH);
    handle
        .control(ControlRequest::from(&config))
        .await
        .context("Failed to configure packager")?;

    let mut next_id = 0;
    let mut video_frames: Vec<(TrackId, Frame)> = Vec::new();
    let mut audio_frames: Vec<(TrackId, Frame)> = Vec::new();

    if let Some(reader) = video {
        let id = TrackId::new(next_id);
        next_id += 1;
        let mut spec = TrackSpec::video(args.codec, args.width, args.height, args.fps);
        if let Some(bitrate) = args.bitrate {
            spec = spec.with_bitrate(bitrate);
        }
        tracing::info!(track = %id, access_units = reader.access_units(), "Attaching video track");
        handle
            .control(ControlRequest::Attach { id, spec })
            .await
            .context("Failed to attach video track")?;
        video_frames = reader.map(|frame| (id, frame)).collect();
    }

    if let Some(reader) = audio {
        let id = TrackId::new(next_id);
        let mut spec = TrackSpec::audio(CodecFamily::Aac, reader.sample_rate(), reader.channels());
        if let Some(bitrate) = args.bitrate {
            spec = spec.with_bitrate(bitrate);
        }
        tracing::info!(
            track = %id,
            sample_rate = reader.sample_rate(),
            channels = reader.channels(),
            "Attaching audio track"
        );
        handle
            .control(ControlRequest::Attach { id, spec })
            .await
            .context("Failed to attach audio track")?;
        audio_frames = reader.map(|frame| (id, frame)).collect();
    }

    let mut frames = interleave(video_frames, audio_frames).peekable();
    let mut total = 0;
    while frames.peek().is_some() {
        let batch: Vec<_> = frames.by_ref().take(BATCH_SIZE).collect();
        total += batch.len();
        handle.send_frames(batch).await.context("Packager stopped")?;
    }
    handle.finish().await.context("Failed to flush packager")?;
    drop(handle);

    let packager = join.await.context("Packager worker panicked")?;
    tracing::info!(frames = total, "Packaging complete");

    if let Some(mpd) = packager.mpd_path() {
        println!("{}", mpd.display());
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            load_config(Some(p))?
        }
        None => {
            println!("No config file specified, using defaults");
            DashConfig::default()
        }
    };
    config.validate().context("Configuration is invalid")?;

    println!("✓ Configuration is valid");
    println!("  Folder: {}", config.folder.display());
    println!("  Base name: {}", config.base_name);
    println!("  Segment duration: {}s", config.segment_duration_secs);
    println!("  Max segments: {}", config.max_segments);
    println!("  Min buffer time: {}s", config.min_buffer_time_secs);
    println!("  Manifest: {}", config.mpd_path().display());
    Ok(())
}
