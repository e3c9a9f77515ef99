mod progress;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use mixforge_core::ffmpeg::{
    detect_ffmpeg, query_encoders, validate_ffmpeg, EncoderSet, FFmpegInfo, MediaProber,
    VideoInfo,
};
use mixforge_core::logging::init_logging;
use mixforge_core::playlist::{self, format_duration, Playlist};
use mixforge_core::render::{
    select_encoder, software_encoder, AacBitrate, Acceleration, AudioFormat, CodecFamily,
    EncoderRequest, FrameRateChoice, HardwareFamily, JobKind, Mp3Bitrate, Quality, RenderConfig,
    RenderJournal, RenderOutcome, RenderSession, ResolutionChoice,
};
use mixforge_core::settings::{AppSettings, SettingsManager};
use mixforge_core::timestamps;
use progress::{ProgressMode, RenderProgress};

#[derive(Parser)]
#[command(
    name = "mixforge",
    version,
    about = "Audio mixes, looped video renders and track timestamps with FFmpeg"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    /// Directory holding settings.json. Default: the platform config directory.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Also print log output on stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Args)]
struct TrackArgs {
    /// Audio files or folders. Folders contribute the audio files directly inside them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Sort tracks by file name.
    #[arg(long, default_value_t = false)]
    sort: bool,

    /// Shuffle tracks.
    #[arg(long, default_value_t = false, conflicts_with = "sort")]
    shuffle: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate audio tracks into one file
    Mix {
        #[command(flatten)]
        tracks: TrackArgs,

        #[arg(short, long)]
        output: PathBuf,

        /// wav or mp3. Default: taken from the output extension, then settings.
        #[arg(long)]
        format: Option<AudioFormat>,

        /// MP3 bitrate in kbps: 128, 192, 256 or 320.
        #[arg(long)]
        bitrate: Option<Mp3Bitrate>,

        /// Do not write <output>_timestamps.txt.
        #[arg(long, default_value_t = false)]
        no_timestamps: bool,

        /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
        #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
        progress: ProgressMode,
    },

    /// Loop a video for the combined length of audio tracks
    Extend {
        /// Source video (mp4, mov or avi).
        video: PathBuf,

        #[command(flatten)]
        tracks: TrackArgs,

        #[arg(short, long)]
        output: PathBuf,

        /// h264, hevc or prores.
        #[arg(long)]
        codec: Option<CodecFamily>,

        /// WIDTHxHEIGHT or "original".
        #[arg(long)]
        resolution: Option<ResolutionChoice>,

        /// N, N/D or "original".
        #[arg(long)]
        fps: Option<FrameRateChoice>,

        /// fast, standard or high.
        #[arg(long)]
        quality: Option<Quality>,

        /// Fade in and out over one second. Forces software encoding.
        #[arg(long, default_value_t = false)]
        fade: bool,

        /// auto, software, nvenc, amf, qsv or videotoolbox.
        #[arg(long)]
        accel: Option<Acceleration>,

        /// AAC bitrate in kbps: 192 or 320.
        #[arg(long)]
        aac_bitrate: Option<AacBitrate>,

        /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
        #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
        progress: ProgressMode,
    },

    /// Print or save the start time of each track in a mix
    Timestamps {
        #[command(flatten)]
        tracks: TrackArgs,

        /// Write the listing to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show durations and video parameters of media files
    Probe {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the video encoders this FFmpeg build offers
    Encoders,

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the settings file location and contents
    Show,
    /// Delete the settings file
    Reset,
    /// Use a specific ffmpeg (and optionally ffprobe) binary
    SetFfmpeg {
        ffmpeg: PathBuf,

        #[arg(long)]
        ffprobe: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
    path: PathBuf,
    duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<VideoInfo>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config_dir {
        Some(dir) => SettingsManager::new(dir),
        None => SettingsManager::default_location()?,
    };
    let settings = manager.load();
    init_logging(&settings.logging, cli.verbose);

    match cli.cmd {
        Commands::Mix {
            tracks,
            output,
            format,
            bitrate,
            no_timestamps,
            progress,
        } => {
            let info = locate_tools(&settings)?;
            let prober = MediaProber::new(&info.ffprobe_path);
            let list = collect_playlist(&tracks, &prober).await?;

            let format = format
                .or_else(|| {
                    output
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .and_then(|ext| ext.parse().ok())
                })
                .unwrap_or(settings.render.audio_format);
            let output = if output.extension().is_none() {
                output.with_extension(format.extension())
            } else {
                output
            };

            let job = JobKind::AudioMix {
                tracks: list.paths(),
                format,
                mp3_bitrate: bitrate.unwrap_or(settings.render.mp3_bitrate),
            };
            let mut request = settings.render.request(output, job);
            if no_timestamps {
                request.write_timestamps = false;
            }
            let config = request.resolve_with(None, list.durations());

            let session = render_session(&info, &settings)?;
            report(render(&session, config, "mix", progress).await?)
        }

        Commands::Extend {
            video,
            tracks,
            output,
            codec,
            resolution,
            fps,
            quality,
            fade,
            accel,
            aac_bitrate,
            progress,
        } => {
            if !playlist::is_video_file(&video) {
                bail!(
                    "{} is not a supported video file ({})",
                    video.display(),
                    playlist::VIDEO_EXTENSIONS.join(", ")
                );
            }
            let info = locate_tools(&settings)?;
            let prober = MediaProber::new(&info.ffprobe_path);
            let list = collect_playlist(&tracks, &prober).await?;

            let job = JobKind::VideoExtend {
                video: video.clone(),
                tracks: list.paths(),
            };
            let mut request = settings.render.request(output, job);
            request.codec = codec.unwrap_or(request.codec);
            request.resolution = resolution.unwrap_or(request.resolution);
            request.frame_rate = fps.unwrap_or(request.frame_rate);
            request.quality = quality.unwrap_or(request.quality);
            request.acceleration = accel.unwrap_or(request.acceleration);
            request.aac_bitrate = aac_bitrate.unwrap_or(request.aac_bitrate);
            request.fade |= fade;

            let video_info = if request.needs_video_probe() {
                Some(prober.video_info(&video).await)
            } else {
                None
            };
            let config = request.resolve_with(video_info, list.durations());
            info!(
                "Rendering {} at {} @ {} fps",
                config.codec, config.resolution, config.frame_rate
            );

            let session = render_session(&info, &settings)?;
            report(render(&session, config, "extend", progress).await?)
        }

        Commands::Timestamps { tracks, output } => {
            let info = locate_tools(&settings)?;
            let prober = MediaProber::new(&info.ffprobe_path);
            let list = collect_playlist(&tracks, &prober).await?;

            match output {
                Some(path) => {
                    timestamps::export(&path, &list.paths(), &list.durations())?;
                    println!("Saved {}", path.display());
                }
                None => print!(
                    "{}",
                    timestamps::render_listing(&list.paths(), &list.durations())
                ),
            }
            Ok(())
        }

        Commands::Probe { inputs, json } => {
            let info = locate_tools(&settings)?;
            let prober = MediaProber::new(&info.ffprobe_path);

            let mut reports = Vec::with_capacity(inputs.len());
            for path in inputs {
                let duration = prober.duration(&path).await;
                let video = if playlist::is_video_file(&path) {
                    Some(prober.video_info(&path).await)
                } else {
                    None
                };
                reports.push(ProbeReport {
                    path,
                    duration,
                    video,
                });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    match &report.video {
                        Some(video) => println!(
                            "{}  {}  {} @ {} fps",
                            report.path.display(),
                            format_duration(report.duration),
                            video.resolution,
                            video.frame_rate
                        ),
                        None => println!(
                            "{}  {}",
                            report.path.display(),
                            format_duration(report.duration)
                        ),
                    }
                }
            }
            Ok(())
        }

        Commands::Encoders => {
            let info = locate_tools(&settings)?;
            let encoders = query_encoders(&info.ffmpeg_path)?;
            println!("{} ({})", info.ffmpeg_path.display(), info.version);
            for line in encoder_summary(&encoders) {
                println!("{}", line);
            }
            Ok(())
        }

        Commands::Config { action } => run_config(&manager, settings, action),
    }
}

fn locate_tools(settings: &AppSettings) -> Result<FFmpegInfo> {
    let info = detect_ffmpeg(&settings.tools).context("FFmpeg is required")?;
    info!(
        "Using {} ({}{})",
        info.ffmpeg_path.display(),
        info.version,
        if info.is_bundled { ", bundled" } else { "" }
    );
    Ok(info)
}

fn render_session(info: &FFmpegInfo, settings: &AppSettings) -> Result<RenderSession> {
    let encoders = query_encoders(&info.ffmpeg_path)?;
    let session = RenderSession::new(
        info.ffmpeg_path.clone(),
        encoders,
        settings.render.progress_stream,
    );
    Ok(match settings.journal.resolved_path() {
        Some(path) => session.with_journal(RenderJournal::new(path)),
        None => session,
    })
}

async fn collect_playlist(args: &TrackArgs, prober: &MediaProber) -> Result<Playlist> {
    let mut paths = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            paths.extend(playlist::scan_folder(input)?);
        } else {
            paths.push(input.clone());
        }
    }

    let mut list = Playlist::new();
    let added = list.add_paths(&paths, prober).await;
    if added < paths.len() {
        warn!(
            "Skipped {} inputs that are duplicates or not audio files",
            paths.len() - added
        );
    }
    if list.is_empty() {
        bail!("No audio tracks selected");
    }

    if args.sort {
        list.sort_by_name();
    }
    if args.shuffle {
        list.shuffle(&mut rand::thread_rng());
    }

    for track in list.tracks() {
        if track.duration.is_none() {
            warn!("Unknown duration for {}", track.path.display());
        }
    }
    info!(
        "{} tracks, {} total",
        list.len(),
        format_duration(Some(list.total_duration()))
    );
    Ok(list)
}

async fn render(
    session: &RenderSession,
    config: RenderConfig,
    label: &str,
    mode: ProgressMode,
) -> Result<RenderOutcome> {
    let mut handle = session
        .start(config)
        .context("Could not build the FFmpeg command")?;

    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling render");
            cancel.cancel();
        }
    });

    let mut view = RenderProgress::new(label, mode);
    while let Some(event) = handle.next_event().await {
        view.handle(&event);
    }
    let outcome = handle.wait().await;
    interrupt.abort();

    view.finish(&outcome);
    Ok(outcome)
}

fn report(outcome: RenderOutcome) -> Result<()> {
    match outcome {
        RenderOutcome::Success {
            elapsed,
            output,
            companion,
        } => {
            println!(
                "Saved {} in {:.1}s",
                output.display(),
                elapsed.as_secs_f64()
            );
            if let Some(path) = companion {
                println!("Timestamps saved to {}", path.display());
            }
            Ok(())
        }
        RenderOutcome::Cancelled => bail!("Render cancelled"),
        RenderOutcome::Failed { diagnostics } => bail!("Render failed:\n{}", diagnostics),
    }
}

fn encoder_summary(encoders: &EncoderSet) -> Vec<String> {
    const FAMILIES: [HardwareFamily; 4] = [
        HardwareFamily::Nvenc,
        HardwareFamily::Amf,
        HardwareFamily::Qsv,
        HardwareFamily::VideoToolbox,
    ];

    [CodecFamily::H264, CodecFamily::Hevc, CodecFamily::Prores]
        .into_iter()
        .map(|codec| {
            let available: Vec<&str> = std::iter::once(software_encoder(codec))
                .chain(FAMILIES.iter().filter_map(|family| family.encoder(codec)))
                .filter(|name| encoders.contains(name))
                .collect();
            let auto = select_encoder(
                EncoderRequest {
                    codec,
                    acceleration: Acceleration::Auto,
                    force_software: false,
                    fade: false,
                },
                encoders,
            )
            .map(|encoder| encoder.name.to_string())
            .unwrap_or_else(|e| e.to_string());

            format!(
                "{:<7} auto: {:<20} available: {}",
                codec.as_str(),
                auto,
                if available.is_empty() {
                    "-".to_string()
                } else {
                    available.join(", ")
                }
            )
        })
        .collect()
}

fn run_config(manager: &SettingsManager, settings: AppSettings, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", manager.settings_path().display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::Reset => {
            manager.reset()?;
            println!("Settings reset to defaults");
        }
        ConfigAction::SetFfmpeg { ffmpeg, ffprobe } => {
            let mut updated = settings;
            updated.tools.ffmpeg = Some(ffmpeg);
            if ffprobe.is_some() {
                updated.tools.ffprobe = ffprobe;
            }

            let info = detect_ffmpeg(&updated.tools)?;
            validate_ffmpeg(&info)?;
            manager.save(&updated)?;
            println!(
                "Using {} and {} ({})",
                info.ffmpeg_path.display(),
                info.ffprobe_path.display(),
                info.version
            );
        }
    }
    Ok(())
}
