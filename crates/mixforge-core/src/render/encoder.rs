//! Encoder selection and encoder-specific arguments.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::{Acceleration, CodecFamily, Quality};
use super::BuildError;
use crate::ffmpeg::{EncoderSet, Resolution};

/// Hardware encoder family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareFamily {
    /// NVIDIA NVENC
    Nvenc,
    /// AMD AMF
    Amf,
    /// Intel QuickSync
    Qsv,
    /// Apple VideoToolbox
    VideoToolbox,
}

impl HardwareFamily {
    pub fn from_acceleration(acceleration: Acceleration) -> Option<Self> {
        match acceleration {
            Acceleration::Nvenc => Some(HardwareFamily::Nvenc),
            Acceleration::Amf => Some(HardwareFamily::Amf),
            Acceleration::Qsv => Some(HardwareFamily::Qsv),
            Acceleration::VideoToolbox => Some(HardwareFamily::VideoToolbox),
            Acceleration::Auto | Acceleration::Software => None,
        }
    }

    /// Families tried by `Acceleration::Auto`, most preferred first.
    pub fn auto_order() -> &'static [HardwareFamily] {
        if cfg!(target_os = "macos") {
            &[HardwareFamily::VideoToolbox]
        } else {
            &[
                HardwareFamily::Nvenc,
                HardwareFamily::Qsv,
                HardwareFamily::Amf,
            ]
        }
    }

    /// FFmpeg encoder name for a codec family, if this hardware has one.
    pub fn encoder(&self, codec: CodecFamily) -> Option<&'static str> {
        match (self, codec) {
            (HardwareFamily::Nvenc, CodecFamily::H264) => Some("h264_nvenc"),
            (HardwareFamily::Nvenc, CodecFamily::Hevc) => Some("hevc_nvenc"),
            (HardwareFamily::Amf, CodecFamily::H264) => Some("h264_amf"),
            (HardwareFamily::Amf, CodecFamily::Hevc) => Some("hevc_amf"),
            (HardwareFamily::Qsv, CodecFamily::H264) => Some("h264_qsv"),
            (HardwareFamily::Qsv, CodecFamily::Hevc) => Some("hevc_qsv"),
            (HardwareFamily::VideoToolbox, CodecFamily::H264) => Some("h264_videotoolbox"),
            (HardwareFamily::VideoToolbox, CodecFamily::Hevc) => Some("hevc_videotoolbox"),
            (HardwareFamily::VideoToolbox, CodecFamily::Prores) => Some("prores_videotoolbox"),
            (_, CodecFamily::Prores) => None,
        }
    }

    /// `-hwaccel` value for decoding on this hardware.
    pub fn hwaccel(&self) -> Option<&'static str> {
        match self {
            HardwareFamily::Nvenc => Some("cuda"),
            HardwareFamily::Qsv => Some("qsv"),
            HardwareFamily::VideoToolbox => Some("videotoolbox"),
            HardwareFamily::Amf => None,
        }
    }

    /// Scale filter that works on frames kept in GPU memory.
    pub fn scaler(&self) -> Option<&'static str> {
        match self {
            HardwareFamily::Nvenc => Some("scale_cuda"),
            HardwareFamily::Qsv => Some("scale_qsv"),
            HardwareFamily::VideoToolbox => Some("scale_vt"),
            HardwareFamily::Amf => None,
        }
    }
}

/// Software encoder for a codec family.
pub fn software_encoder(codec: CodecFamily) -> &'static str {
    match codec {
        CodecFamily::H264 => "libx264",
        CodecFamily::Hevc => "libx265",
        CodecFamily::Prores => "prores_ks",
    }
}

/// Where decoded frames live between decoder, filters and encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePath {
    /// Software decode, software filters.
    System,
    /// Hardware decode downloaded to system memory for software filters.
    DecodeOnly { hwaccel: &'static str },
    /// Decode, scale and encode without leaving the GPU.
    Gpu {
        hwaccel: &'static str,
        scaler: &'static str,
    },
}

/// The encoder a command will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEncoder {
    pub name: &'static str,
    pub codec: CodecFamily,
    pub family: Option<HardwareFamily>,
}

impl ResolvedEncoder {
    pub fn software(codec: CodecFamily) -> Self {
        Self {
            name: software_encoder(codec),
            codec,
            family: None,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.family.is_some()
    }

    pub fn frame_path(&self) -> FramePath {
        let Some(family) = self.family else {
            return FramePath::System;
        };
        match (family.hwaccel(), family.scaler()) {
            // The ProRes hardware encoder takes 4:2:2 input, not the
            // decoder's native 4:2:0 surface.
            (Some(hwaccel), _) if self.codec == CodecFamily::Prores => {
                FramePath::DecodeOnly { hwaccel }
            }
            (Some(hwaccel), Some(scaler)) => FramePath::Gpu { hwaccel, scaler },
            (Some(hwaccel), None) => FramePath::DecodeOnly { hwaccel },
            (None, _) => FramePath::System,
        }
    }

    /// `-pix_fmt` value, or `None` when frames stay in hardware surfaces.
    pub fn pixel_format(&self) -> Option<&'static str> {
        match (self.codec, self.family) {
            (CodecFamily::Prores, None) => Some("yuv422p10le"),
            (CodecFamily::Prores, Some(_)) => None,
            _ => match self.frame_path() {
                FramePath::Gpu { .. } => None,
                FramePath::System | FramePath::DecodeOnly { .. } => Some("yuv420p"),
            },
        }
    }

    /// Quality arguments for this encoder and tier.
    pub fn quality_args(&self, quality: Quality, resolution: Resolution) -> Vec<String> {
        if self.codec == CodecFamily::Prores {
            let profile = match quality {
                Quality::High => "3",
                Quality::Fast | Quality::Standard => "2",
            };
            return vec!["-profile:v".to_string(), profile.to_string()];
        }

        let q = constant_quality(quality).to_string();
        match self.family {
            Some(HardwareFamily::Nvenc) => vec!["-cq".to_string(), q],
            Some(HardwareFamily::Amf) => vec![
                "-rc".to_string(),
                "cqp".to_string(),
                "-qp_i".to_string(),
                q.clone(),
                "-qp_p".to_string(),
                q,
            ],
            Some(HardwareFamily::Qsv) => vec!["-global_quality".to_string(), q],
            Some(HardwareFamily::VideoToolbox) => vec![
                "-b:v".to_string(),
                videotoolbox_bitrate(quality, resolution).to_string(),
            ],
            None => vec![
                "-crf".to_string(),
                q,
                "-preset".to_string(),
                software_preset(quality).to_string(),
            ],
        }
    }
}

/// Constant-quality value shared by CRF and the hardware CQ modes.
pub fn constant_quality(quality: Quality) -> u8 {
    match quality {
        Quality::Fast => 28,
        Quality::Standard => 23,
        Quality::High => 18,
    }
}

/// x264/x265 preset string
pub fn software_preset(quality: Quality) -> &'static str {
    match quality {
        Quality::Fast => "ultrafast",
        Quality::Standard => "fast",
        Quality::High => "medium",
    }
}

/// VideoToolbox has no constant-quality mode usable here, so tiers map to
/// bitrates scaled for outputs above 1080p.
pub fn videotoolbox_bitrate(quality: Quality, resolution: Resolution) -> &'static str {
    let above_1080p = resolution.pixels() > Resolution::new(1920, 1080).pixels();
    match (quality, above_1080p) {
        (Quality::Fast, false) => "10M",
        (Quality::Standard, false) => "15M",
        (Quality::High, false) => "20M",
        (Quality::Fast, true) => "25M",
        (Quality::Standard, true) => "50M",
        (Quality::High, true) => "80M",
    }
}

/// Inputs to encoder selection.
#[derive(Debug, Clone, Copy)]
pub struct EncoderRequest {
    pub codec: CodecFamily,
    pub acceleration: Acceleration,
    pub force_software: bool,
    pub fade: bool,
}

/// Pick the encoder for a request and check that ffmpeg ships it.
///
/// Fades are applied with software filters, so a fade always selects the
/// software encoder and no hardware flags are emitted.
pub fn select_encoder(
    request: EncoderRequest,
    available: &EncoderSet,
) -> Result<ResolvedEncoder, BuildError> {
    let software = ResolvedEncoder::software(request.codec);

    let resolved = if request.force_software || request.acceleration == Acceleration::Software {
        software
    } else if request.fade {
        if request.acceleration != Acceleration::Auto {
            info!(
                "Fade requested; using {} instead of {} encoding",
                software.name, request.acceleration
            );
        }
        software
    } else if let Some(family) = HardwareFamily::from_acceleration(request.acceleration) {
        match family.encoder(request.codec) {
            Some(name) => ResolvedEncoder {
                name,
                codec: request.codec,
                family: Some(family),
            },
            None => {
                debug!(
                    "{:?} has no {} encoder, using {}",
                    family, request.codec, software.name
                );
                software
            }
        }
    } else {
        HardwareFamily::auto_order()
            .iter()
            .find_map(|family| {
                family
                    .encoder(request.codec)
                    .filter(|name| available.contains(name))
                    .map(|name| ResolvedEncoder {
                        name,
                        codec: request.codec,
                        family: Some(*family),
                    })
            })
            .unwrap_or(software)
    };

    if !available.contains(resolved.name) {
        return Err(BuildError::CodecUnavailable {
            encoder: resolved.name.to_string(),
        });
    }

    debug!("Selected encoder {}", resolved.name);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(codec: CodecFamily, acceleration: Acceleration) -> EncoderRequest {
        EncoderRequest {
            codec,
            acceleration,
            force_software: false,
            fade: false,
        }
    }

    fn all_encoders() -> EncoderSet {
        EncoderSet::from_names([
            "libx264",
            "libx265",
            "prores_ks",
            "h264_nvenc",
            "hevc_nvenc",
            "h264_amf",
            "h264_qsv",
            "h264_videotoolbox",
            "hevc_videotoolbox",
            "prores_videotoolbox",
        ])
    }

    #[test]
    fn test_hardware_encoder_names() {
        assert_eq!(
            HardwareFamily::Nvenc.encoder(CodecFamily::H264),
            Some("h264_nvenc")
        );
        assert_eq!(HardwareFamily::Amf.encoder(CodecFamily::Hevc), Some("hevc_amf"));
        assert_eq!(HardwareFamily::Qsv.encoder(CodecFamily::Prores), None);
        assert_eq!(
            HardwareFamily::VideoToolbox.encoder(CodecFamily::Prores),
            Some("prores_videotoolbox")
        );
        assert_eq!(software_encoder(CodecFamily::Hevc), "libx265");
    }

    #[test]
    fn test_explicit_hardware_selection() {
        let encoder =
            select_encoder(request(CodecFamily::H264, Acceleration::Nvenc), &all_encoders())
                .unwrap();
        assert_eq!(encoder.name, "h264_nvenc");
        assert!(encoder.is_hardware());
    }

    #[test]
    fn test_fade_forces_software() {
        let mut req = request(CodecFamily::H264, Acceleration::VideoToolbox);
        req.fade = true;
        let encoder = select_encoder(req, &all_encoders()).unwrap();
        assert_eq!(encoder.name, "libx264");
        assert!(!encoder.is_hardware());
        assert_eq!(encoder.frame_path(), FramePath::System);
    }

    #[test]
    fn test_force_software() {
        let mut req = request(CodecFamily::Hevc, Acceleration::Nvenc);
        req.force_software = true;
        assert_eq!(
            select_encoder(req, &all_encoders()).unwrap().name,
            "libx265"
        );
    }

    #[test]
    fn test_auto_picks_available_hardware_or_software() {
        let encoder =
            select_encoder(request(CodecFamily::H264, Acceleration::Auto), &all_encoders())
                .unwrap();
        assert!(encoder.is_hardware());

        let software_only = EncoderSet::from_names(["libx264"]);
        let encoder =
            select_encoder(request(CodecFamily::H264, Acceleration::Auto), &software_only)
                .unwrap();
        assert_eq!(encoder.name, "libx264");
    }

    #[test]
    fn test_unavailable_encoder_is_an_error() {
        let set = EncoderSet::from_names(["libx264"]);
        let err = select_encoder(request(CodecFamily::Hevc, Acceleration::Qsv), &set).unwrap_err();
        assert!(matches!(
            err,
            BuildError::CodecUnavailable { ref encoder } if encoder == "hevc_qsv"
        ));

        let err =
            select_encoder(request(CodecFamily::Prores, Acceleration::Software), &set).unwrap_err();
        assert!(matches!(err, BuildError::CodecUnavailable { .. }));
    }

    #[test]
    fn test_prores_on_non_apple_hardware_uses_prores_ks() {
        let encoder =
            select_encoder(request(CodecFamily::Prores, Acceleration::Nvenc), &all_encoders())
                .unwrap();
        assert_eq!(encoder.name, "prores_ks");
    }

    #[test]
    fn test_quality_args_per_family() {
        let hd = Resolution::new(1920, 1080);
        let enc = |name, family| ResolvedEncoder {
            name,
            codec: CodecFamily::H264,
            family,
        };

        assert_eq!(
            enc("h264_nvenc", Some(HardwareFamily::Nvenc)).quality_args(Quality::Fast, hd),
            vec!["-cq", "28"]
        );
        assert_eq!(
            enc("h264_amf", Some(HardwareFamily::Amf)).quality_args(Quality::Standard, hd),
            vec!["-rc", "cqp", "-qp_i", "23", "-qp_p", "23"]
        );
        assert_eq!(
            enc("h264_qsv", Some(HardwareFamily::Qsv)).quality_args(Quality::High, hd),
            vec!["-global_quality", "18"]
        );
        assert_eq!(
            enc("libx264", None).quality_args(Quality::Standard, hd),
            vec!["-crf", "23", "-preset", "fast"]
        );
    }

    #[test]
    fn test_videotoolbox_bitrate_table() {
        let hd = Resolution::new(1920, 1080);
        let uhd = Resolution::new(3840, 2160);
        assert_eq!(videotoolbox_bitrate(Quality::Fast, hd), "10M");
        assert_eq!(videotoolbox_bitrate(Quality::High, hd), "20M");
        assert_eq!(videotoolbox_bitrate(Quality::Standard, uhd), "50M");
        assert_eq!(videotoolbox_bitrate(Quality::High, uhd), "80M");
    }

    #[test]
    fn test_prores_profile() {
        let enc = ResolvedEncoder::software(CodecFamily::Prores);
        let hd = Resolution::default();
        assert_eq!(enc.quality_args(Quality::High, hd), vec!["-profile:v", "3"]);
        assert_eq!(enc.quality_args(Quality::Fast, hd), vec!["-profile:v", "2"]);
    }

    #[test]
    fn test_gpu_frame_paths_emit_no_pixel_format() {
        for family in [
            HardwareFamily::Nvenc,
            HardwareFamily::Qsv,
            HardwareFamily::VideoToolbox,
        ] {
            for codec in [CodecFamily::H264, CodecFamily::Hevc] {
                let enc = ResolvedEncoder {
                    name: family.encoder(codec).unwrap(),
                    codec,
                    family: Some(family),
                };
                assert!(
                    matches!(enc.frame_path(), FramePath::Gpu { .. }),
                    "{:?} {:?}",
                    family,
                    codec
                );
                assert_eq!(enc.pixel_format(), None, "{:?} {:?}", family, codec);
            }
        }
    }

    #[test]
    fn test_pixel_format_and_frame_path() {
        let x264 = ResolvedEncoder::software(CodecFamily::H264);
        assert_eq!(x264.pixel_format(), Some("yuv420p"));

        let prores_ks = ResolvedEncoder::software(CodecFamily::Prores);
        assert_eq!(prores_ks.pixel_format(), Some("yuv422p10le"));

        let nvenc = ResolvedEncoder {
            name: "h264_nvenc",
            codec: CodecFamily::H264,
            family: Some(HardwareFamily::Nvenc),
        };
        assert_eq!(
            nvenc.frame_path(),
            FramePath::Gpu {
                hwaccel: "cuda",
                scaler: "scale_cuda"
            }
        );
        assert_eq!(nvenc.pixel_format(), None);

        let amf = ResolvedEncoder {
            name: "h264_amf",
            codec: CodecFamily::H264,
            family: Some(HardwareFamily::Amf),
        };
        assert_eq!(amf.frame_path(), FramePath::System);
        assert_eq!(amf.pixel_format(), Some("yuv420p"));

        let vt_prores = ResolvedEncoder {
            name: "prores_videotoolbox",
            codec: CodecFamily::Prores,
            family: Some(HardwareFamily::VideoToolbox),
        };
        assert_eq!(
            vt_prores.frame_path(),
            FramePath::DecodeOnly {
                hwaccel: "videotoolbox"
            }
        );
        assert_eq!(vt_prores.pixel_format(), None);
    }
}
