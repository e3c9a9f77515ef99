//! FFmpeg argument construction.
//!
//! The builder is pure: the same [`RenderConfig`] and encoder set always give
//! the same argument list. Progress flags are added later by the runner.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::config::{AudioFormat, JobKind, Mp3Bitrate, RenderConfig};
use super::encoder::{select_encoder, EncoderRequest, FramePath};
use super::filter_graph::{Filter, FilterChain, FilterGraph, StreamLabel};
use super::BuildError;
use crate::ffmpeg::EncoderSet;

/// A ready-to-run ffmpeg invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommand {
    /// Arguments after the program name, ending with the output path.
    pub args: Vec<String>,
    /// Encoder that produces the main output stream.
    pub encoder: String,
    /// Whether the command uses a hardware encoder and may be retried in software.
    pub is_hardware: bool,
    /// Expected output length in seconds, used for progress.
    pub total_duration: f64,
    pub output: PathBuf,
}

impl BuiltCommand {
    /// Arguments joined for logging.
    pub fn command_line(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains([' ', ';', '[']) {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Builds commands against the encoders of one ffmpeg installation.
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    encoders: &'a EncoderSet,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(encoders: &'a EncoderSet) -> Self {
        Self { encoders }
    }

    pub fn build(&self, config: &RenderConfig) -> Result<BuiltCommand, BuildError> {
        let command = match &config.job {
            JobKind::AudioMix {
                tracks,
                format,
                mp3_bitrate,
            } => build_audio_mix(config, tracks, *format, *mp3_bitrate)?,
            JobKind::VideoExtend { video, .. } => self.build_video_extend(config, video)?,
        };
        debug!("Built ffmpeg command: {}", command.command_line());
        Ok(command)
    }

    fn build_video_extend(
        &self,
        config: &RenderConfig,
        video: &Path,
    ) -> Result<BuiltCommand, BuildError> {
        let tracks = config.tracks();
        if tracks.is_empty() {
            return Err(BuildError::NoAudioTracks);
        }
        let total = config.total_audio_secs();
        if total <= 0.0 {
            return Err(BuildError::ZeroDuration);
        }

        let encoder = select_encoder(
            EncoderRequest {
                codec: config.codec,
                acceleration: config.acceleration,
                force_software: config.force_software,
                fade: config.fade,
            },
            self.encoders,
        )?;
        let frame_path = encoder.frame_path();

        let mut graph = FilterGraph::new();
        let video_out = StreamLabel::named("v_out");
        graph.push(
            FilterChain::new()
                .input(StreamLabel::video(0))
                .filter(scale_filter(config, frame_path))
                .filter(Filter::new("fps").arg(config.frame_rate))
                .filters(if config.fade {
                    Filter::fade_pair("fade", total).to_vec()
                } else {
                    Vec::new()
                })
                .output(video_out.clone()),
        );
        let audio_map = audio_chains(&mut graph, tracks.len(), config.fade, total);

        let mut args = vec!["-y".to_string()];
        match frame_path {
            FramePath::System => {}
            FramePath::DecodeOnly { hwaccel } => {
                args.extend(["-hwaccel".to_string(), hwaccel.to_string()]);
            }
            FramePath::Gpu { hwaccel, .. } => {
                args.extend([
                    "-hwaccel".to_string(),
                    hwaccel.to_string(),
                    "-hwaccel_output_format".to_string(),
                    hwaccel.to_string(),
                ]);
            }
        }
        args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            path_arg(video),
        ]);
        for track in tracks {
            args.push("-i".to_string());
            args.push(path_arg(track));
        }
        args.extend([
            "-filter_complex".to_string(),
            graph.to_string(),
            "-map".to_string(),
            video_out.map_arg(),
            "-map".to_string(),
            audio_map,
            "-c:v".to_string(),
            encoder.name.to_string(),
        ]);
        if let Some(pix_fmt) = encoder.pixel_format() {
            args.push("-pix_fmt".to_string());
            args.push(pix_fmt.to_string());
        }
        args.extend(encoder.quality_args(config.quality, config.resolution));
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", config.aac_bitrate.kbps()),
            "-shortest".to_string(),
            path_arg(&config.output),
        ]);

        Ok(BuiltCommand {
            args,
            encoder: encoder.name.to_string(),
            is_hardware: encoder.is_hardware(),
            total_duration: total,
            output: config.output.clone(),
        })
    }
}

fn build_audio_mix(
    config: &RenderConfig,
    tracks: &[PathBuf],
    format: AudioFormat,
    mp3_bitrate: Mp3Bitrate,
) -> Result<BuiltCommand, BuildError> {
    if tracks.is_empty() {
        return Err(BuildError::NoAudioTracks);
    }

    let total = config.total_audio_secs();
    let out = StreamLabel::named("outa");

    let mut graph = FilterGraph::new();
    let concat = FilterChain::new()
        .inputs((0..tracks.len()).map(StreamLabel::audio))
        .filter(Filter::concat(tracks.len(), 0, 1));
    if config.fade {
        let joined = StreamLabel::named("a_concat");
        graph.push(concat.output(joined.clone()));
        graph.push(
            FilterChain::new()
                .input(joined)
                .filters(Filter::fade_pair("afade", total))
                .output(out.clone()),
        );
    } else {
        graph.push(concat.output(out.clone()));
    }

    let mut args = vec!["-y".to_string()];
    for track in tracks {
        args.push("-i".to_string());
        args.push(path_arg(track));
    }
    args.extend([
        "-filter_complex".to_string(),
        graph.to_string(),
        "-map".to_string(),
        out.map_arg(),
        "-c:a".to_string(),
        format.encoder().to_string(),
    ]);
    if format == AudioFormat::Mp3 {
        args.push("-b:a".to_string());
        args.push(format!("{}k", mp3_bitrate.kbps()));
    }
    args.push(path_arg(&config.output));

    Ok(BuiltCommand {
        args,
        encoder: format.encoder().to_string(),
        is_hardware: false,
        total_duration: total,
        output: config.output.clone(),
    })
}

fn scale_filter(config: &RenderConfig, frame_path: FramePath) -> Filter {
    let resolution = config.resolution;
    match frame_path {
        FramePath::Gpu { scaler, .. } => Filter::new(scaler)
            .kv("w", resolution.width)
            .kv("h", resolution.height),
        FramePath::System | FramePath::DecodeOnly { .. } => Filter::new("scale")
            .arg(resolution.width)
            .arg(resolution.height),
    }
}

/// Add the audio chains for `count` tracks (inputs `1..=count`) and return
/// the `-map` value for the resulting stream.
fn audio_chains(graph: &mut FilterGraph, count: usize, fade: bool, total: f64) -> String {
    let audio_out = StreamLabel::named("a_out");

    let source = if count > 1 {
        let label = if fade {
            StreamLabel::named("a_concat")
        } else {
            audio_out.clone()
        };
        graph.push(
            FilterChain::new()
                .inputs((1..=count).map(StreamLabel::audio))
                .filter(Filter::concat(count, 0, 1))
                .output(label.clone()),
        );
        label
    } else {
        StreamLabel::audio(1)
    };

    if fade {
        graph.push(
            FilterChain::new()
                .input(source)
                .filters(Filter::fade_pair("afade", total))
                .output(audio_out.clone()),
        );
        return audio_out.map_arg();
    }

    if count > 1 {
        audio_out.map_arg()
    } else {
        "1:a".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::{FrameRate, Resolution};
    use crate::render::config::{AacBitrate, Acceleration, CodecFamily, Quality};

    fn encoders() -> EncoderSet {
        EncoderSet::from_names([
            "libx264",
            "libx265",
            "prores_ks",
            "h264_nvenc",
            "h264_amf",
            "hevc_qsv",
            "h264_videotoolbox",
            "prores_videotoolbox",
        ])
    }

    fn extend_config(tracks: usize, durations: Vec<Option<f64>>) -> RenderConfig {
        RenderConfig {
            output: PathBuf::from("out.mp4"),
            job: JobKind::VideoExtend {
                video: PathBuf::from("loop.mp4"),
                tracks: (0..tracks)
                    .map(|i| PathBuf::from(format!("t{i}.mp3")))
                    .collect(),
            },
            codec: CodecFamily::H264,
            resolution: Resolution::new(1920, 1080),
            frame_rate: FrameRate::whole(30),
            quality: Quality::Standard,
            fade: false,
            acceleration: Acceleration::Software,
            force_software: false,
            aac_bitrate: AacBitrate::K320,
            write_timestamps: false,
            track_durations: durations,
        }
    }

    fn mix_config(format: AudioFormat, fade: bool) -> RenderConfig {
        RenderConfig {
            output: PathBuf::from("mix.mp3"),
            job: JobKind::AudioMix {
                tracks: vec![PathBuf::from("a.mp3"), PathBuf::from("b.wav")],
                format,
                mp3_bitrate: Mp3Bitrate::K256,
            },
            fade,
            track_durations: vec![Some(65.0), Some(40.0)],
            ..extend_config(0, vec![])
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_audio_mix_mp3() {
        let built = CommandBuilder::new(&encoders())
            .build(&mix_config(AudioFormat::Mp3, false))
            .unwrap();
        assert_eq!(
            built.args,
            vec![
                "-y",
                "-i",
                "a.mp3",
                "-i",
                "b.wav",
                "-filter_complex",
                "[0:a][1:a]concat=n=2:v=0:a=1[outa]",
                "-map",
                "[outa]",
                "-c:a",
                "libmp3lame",
                "-b:a",
                "256k",
                "mix.mp3",
            ]
        );
        assert!(!built.is_hardware);
        assert_eq!(built.total_duration, 105.0);
    }

    #[test]
    fn test_audio_mix_wav_with_fade() {
        let built = CommandBuilder::new(&encoders())
            .build(&mix_config(AudioFormat::Wav, true))
            .unwrap();
        assert_eq!(
            value_after(&built.args, "-filter_complex"),
            Some(
                "[0:a][1:a]concat=n=2:v=0:a=1[a_concat];\
                 [a_concat]afade=t=in:st=0:d=1,afade=t=out:st=104.000:d=1[outa]"
            )
        );
        assert_eq!(value_after(&built.args, "-c:a"), Some("pcm_s16le"));
        assert!(!built.args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_audio_mix_without_tracks() {
        let mut config = mix_config(AudioFormat::Mp3, false);
        config.job = JobKind::AudioMix {
            tracks: vec![],
            format: AudioFormat::Mp3,
            mp3_bitrate: Mp3Bitrate::K192,
        };
        assert!(matches!(
            CommandBuilder::new(&encoders()).build(&config),
            Err(BuildError::NoAudioTracks)
        ));
    }

    #[test]
    fn test_video_extend_software_full_command() {
        let config = extend_config(2, vec![Some(65.0), Some(40.0)]);
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();
        assert_eq!(
            built.args,
            vec![
                "-y",
                "-stream_loop",
                "-1",
                "-i",
                "loop.mp4",
                "-i",
                "t0.mp3",
                "-i",
                "t1.mp3",
                "-filter_complex",
                "[0:v]scale=1920:1080,fps=30[v_out];[1:a][2:a]concat=n=2:v=0:a=1[a_out]",
                "-map",
                "[v_out]",
                "-map",
                "[a_out]",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-crf",
                "23",
                "-preset",
                "fast",
                "-c:a",
                "aac",
                "-b:a",
                "320k",
                "-shortest",
                "out.mp4",
            ]
        );
        assert!(!built.is_hardware);
    }

    #[test]
    fn test_video_extend_fade_uses_summed_duration() {
        let mut config = extend_config(3, vec![Some(65.0), Some(40.0), Some(125.0)]);
        config.fade = true;
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();
        assert_eq!(
            value_after(&built.args, "-filter_complex"),
            Some(
                "[0:v]scale=1920:1080,fps=30,fade=t=in:st=0:d=1,fade=t=out:st=229.000:d=1[v_out];\
                 [1:a][2:a][3:a]concat=n=3:v=0:a=1[a_concat];\
                 [a_concat]afade=t=in:st=0:d=1,afade=t=out:st=229.000:d=1[a_out]"
            )
        );
        assert_eq!(built.total_duration, 230.0);
    }

    #[test]
    fn test_video_extend_single_track_skips_concat() {
        let config = extend_config(1, vec![Some(30.0)]);
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();
        assert_eq!(
            value_after(&built.args, "-filter_complex"),
            Some("[0:v]scale=1920:1080,fps=30[v_out]")
        );
        let maps: Vec<_> = built
            .args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| built.args[i + 1].as_str())
            .collect();
        assert_eq!(maps, vec!["[v_out]", "1:a"]);
    }

    #[test]
    fn test_video_extend_single_track_with_fade() {
        let mut config = extend_config(1, vec![Some(30.0)]);
        config.fade = true;
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();
        let graph = value_after(&built.args, "-filter_complex").unwrap();
        assert!(graph.ends_with("[1:a]afade=t=in:st=0:d=1,afade=t=out:st=29.000:d=1[a_out]"));
    }

    #[test]
    fn test_video_extend_zero_duration() {
        let config = extend_config(2, vec![None, Some(0.0)]);
        assert!(matches!(
            CommandBuilder::new(&encoders()).build(&config),
            Err(BuildError::ZeroDuration)
        ));
    }

    #[test]
    fn test_hardware_with_fade_has_no_hardware_flags() {
        let mut config = extend_config(2, vec![Some(10.0), Some(10.0)]);
        config.acceleration = Acceleration::VideoToolbox;
        config.fade = true;
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();

        assert_eq!(built.encoder, "libx264");
        assert!(!built.is_hardware);
        assert!(!built.args.iter().any(|a| a.starts_with("-hwaccel")));
        assert!(!built.args.iter().any(|a| a.contains("videotoolbox")));
        assert!(!built.args.iter().any(|a| a.contains("scale_")));
    }

    #[test]
    fn test_nvenc_gpu_path() {
        let mut config = extend_config(1, vec![Some(10.0)]);
        config.acceleration = Acceleration::Nvenc;
        config.quality = Quality::High;
        config.frame_rate = FrameRate::new(30000, 1001).unwrap();
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();

        assert!(built.is_hardware);
        assert_eq!(
            &built.args[..5],
            ["-y", "-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]
        );
        assert_eq!(
            value_after(&built.args, "-filter_complex"),
            Some("[0:v]scale_cuda=w=1920:h=1080,fps=30000/1001[v_out]")
        );
        assert_eq!(value_after(&built.args, "-cq"), Some("18"));
        assert!(!built.args.contains(&"-pix_fmt".to_string()));
    }

    #[test]
    fn test_amf_uses_software_scale() {
        let mut config = extend_config(1, vec![Some(10.0)]);
        config.acceleration = Acceleration::Amf;
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();

        assert!(built.is_hardware);
        assert!(!built.args.iter().any(|a| a == "-hwaccel"));
        assert_eq!(value_after(&built.args, "-pix_fmt"), Some("yuv420p"));
        assert_eq!(value_after(&built.args, "-qp_p"), Some("23"));
    }

    #[test]
    fn test_forced_software_retry_config() {
        let mut config = extend_config(1, vec![Some(10.0)]);
        config.acceleration = Acceleration::Nvenc;
        let retry = config.with_forced_software();
        let built = CommandBuilder::new(&encoders()).build(&retry).unwrap();
        assert_eq!(built.encoder, "libx264");
        assert!(!built.is_hardware);
    }

    #[test]
    fn test_videotoolbox_prores() {
        let mut config = extend_config(1, vec![Some(10.0)]);
        config.acceleration = Acceleration::VideoToolbox;
        config.codec = CodecFamily::Prores;
        config.quality = Quality::High;
        let built = CommandBuilder::new(&encoders()).build(&config).unwrap();

        assert_eq!(&built.args[..3], ["-y", "-hwaccel", "videotoolbox"]);
        assert_eq!(built.args[3], "-stream_loop");
        assert_eq!(value_after(&built.args, "-c:v"), Some("prores_videotoolbox"));
        assert_eq!(value_after(&built.args, "-profile:v"), Some("3"));
        assert!(!built.args.contains(&"-pix_fmt".to_string()));
    }

    #[test]
    fn test_missing_encoder_fails_before_spawn() {
        let mut config = extend_config(1, vec![Some(10.0)]);
        config.codec = CodecFamily::Hevc;
        config.acceleration = Acceleration::Nvenc;
        assert!(matches!(
            CommandBuilder::new(&encoders()).build(&config),
            Err(BuildError::CodecUnavailable { .. })
        ));
    }

    #[test]
    fn test_build_is_deterministic() {
        let config = extend_config(2, vec![Some(3.0), Some(4.0)]);
        let set = encoders();
        let builder = CommandBuilder::new(&set);
        assert_eq!(builder.build(&config).unwrap(), builder.build(&config).unwrap());
    }

    #[test]
    fn test_command_line_quotes_graph() {
        let built = CommandBuilder::new(&encoders())
            .build(&extend_config(1, vec![Some(1.0)]))
            .unwrap();
        assert!(built.command_line().contains("\"[0:v]"));
    }
}
