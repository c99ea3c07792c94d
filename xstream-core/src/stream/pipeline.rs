//! Typed encode pipeline description.
//!
//! Every mount gets the same [`PipelineConfig`]: raw RGBA frames enter a
//! live source, pass a leaky queue, are converted to a planar format and
//! encoded. The transport decides how to realise it; a GStreamer-backed
//! transport can use [`PipelineConfig::launch_description`].

use serde::{Deserialize, Serialize};

use crate::error::XStreamError;

// ── Formats ──────────────────────────────────────────────────────

/// Raw pixel layouts that appear in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RawFormat {
    /// 8-bit RGBA, what endpoints produce.
    Rgba,
    /// Planar YUV 4:2:0, what encoders consume.
    #[default]
    I420,
}

impl std::fmt::Display for RawFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rgba => write!(f, "RGBA"),
            Self::I420 => write!(f, "I420"),
        }
    }
}

/// Caps announced for one mount's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCaps {
    pub format: RawFormat,
    pub width: u32,
    pub height: u32,
    /// `(numerator, denominator)`; `0/1` means variable rate.
    pub framerate: (u32, u32),
}

impl VideoCaps {
    /// Variable-rate RGBA caps for a region of `width` x `height`.
    pub fn rgba(width: u32, height: u32) -> Self {
        Self {
            format: RawFormat::Rgba,
            width,
            height,
            framerate: (0, 1),
        }
    }
}

impl std::fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video/x-raw,format={},width={},height={},framerate={}/{}",
            self.format, self.width, self.height, self.framerate.0, self.framerate.1
        )
    }
}

// ── Codec ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum H264Encoder {
    #[default]
    Software,
    /// Platform encoder (VideoToolbox and friends).
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct H264Options {
    pub encoder: H264Encoder,
    /// Encoder quality, 0.0..=1.0. Only the hardware encoder honours it.
    pub quality: f32,
    pub realtime: bool,
    /// RTP dynamic payload type, 96..=127.
    pub payload_type: u8,
}

impl Default for H264Options {
    fn default() -> Self {
        Self {
            encoder: H264Encoder::Software,
            quality: 0.25,
            realtime: true,
            payload_type: 96,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MjpegOptions {
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for MjpegOptions {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

/// Encoder selection. H.264 is slower to encode but needs less bandwidth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Codec {
    H264(H264Options),
    Mjpeg(MjpegOptions),
}

impl Default for Codec {
    fn default() -> Self {
        Self::H264(H264Options::default())
    }
}

// ── PipelineConfig ───────────────────────────────────────────────

/// Validated per-mount encode pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub codec: Codec,
    /// Queue depth in milliseconds; older frames are discarded.
    pub queue_max_ms: u32,
    pub live: bool,
    /// Block the source when the queue is full.
    pub block: bool,
    pub min_latency_ms: u32,
    pub convert_to: RawFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            queue_max_ms: 500,
            live: true,
            block: true,
            min_latency_ms: 0,
            convert_to: RawFormat::I420,
        }
    }
}

impl PipelineConfig {
    /// Check every option against its allowed range.
    pub fn validate(&self) -> Result<(), XStreamError> {
        if self.queue_max_ms == 0 {
            return Err(XStreamError::InvalidPipeline(
                "queue_max_ms must be greater than 0".into(),
            ));
        }
        if self.convert_to != RawFormat::I420 {
            return Err(XStreamError::InvalidPipeline(format!(
                "cannot convert to {}; only I420 is supported",
                self.convert_to
            )));
        }
        match &self.codec {
            Codec::H264(h) => {
                if !(0.0..=1.0).contains(&h.quality) {
                    return Err(XStreamError::InvalidPipeline(format!(
                        "h264 quality {} outside 0.0..=1.0",
                        h.quality
                    )));
                }
                if !(96..=127).contains(&h.payload_type) {
                    return Err(XStreamError::InvalidPipeline(format!(
                        "payload type {} outside 96..=127",
                        h.payload_type
                    )));
                }
            }
            Codec::Mjpeg(m) => {
                if !(1..=100).contains(&m.quality) {
                    return Err(XStreamError::InvalidPipeline(format!(
                        "mjpeg quality {} outside 1..=100",
                        m.quality
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render as a `gst-launch` style description for one mount.
    pub fn launch_description(&self, caps: &VideoCaps) -> String {
        let mut launch = format!(
            "( appsrc name=src format=time block={} is-live={} do-timestamp=true min-latency={} caps={caps} ! \
             queue max-size-time={} leaky=downstream ! videoconvert ! video/x-raw,format={} ! ",
            self.block,
            self.live,
            u64::from(self.min_latency_ms) * 1_000_000,
            u64::from(self.queue_max_ms) * 1_000_000,
            self.convert_to,
        );
        match &self.codec {
            Codec::H264(h) => {
                match h.encoder {
                    H264Encoder::Software => launch.push_str("x264enc tune=zerolatency ! "),
                    H264Encoder::Hardware => launch.push_str(&format!(
                        "vtenc_h264 quality={} realtime={} ! ",
                        h.quality, h.realtime
                    )),
                }
                launch.push_str(&format!("rtph264pay name=pay0 pt={} )", h.payload_type));
            }
            Codec::Mjpeg(m) => {
                launch.push_str(&format!(
                    "jpegenc quality={} ! rtpjpegpay name=pay0 )",
                    m.quality
                ));
            }
        }
        launch
    }
}

// ── PipelineBuilder ──────────────────────────────────────────────

/// Fluent construction of a [`PipelineConfig`]; [`build`](Self::build)
/// validates.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Start from the H.264 defaults.
    pub fn h264() -> Self {
        Self::default()
    }

    /// Start from the MJPEG defaults.
    pub fn mjpeg() -> Self {
        let mut b = Self::default();
        b.config.codec = Codec::Mjpeg(MjpegOptions::default());
        b
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Select the H.264 encoder. No effect on MJPEG pipelines.
    pub fn encoder(mut self, encoder: H264Encoder) -> Self {
        if let Codec::H264(h) = &mut self.config.codec {
            h.encoder = encoder;
        }
        self
    }

    /// Encoder quality: 0.0..=1.0 for H.264, rounded into 1..=100 for MJPEG.
    pub fn quality(mut self, quality: f32) -> Self {
        match &mut self.config.codec {
            Codec::H264(h) => h.quality = quality,
            Codec::Mjpeg(m) => m.quality = (quality * 100.0).round().clamp(0.0, 255.0) as u8,
        }
        self
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        if let Codec::H264(h) = &mut self.config.codec {
            h.realtime = realtime;
        }
        self
    }

    pub fn payload_type(mut self, pt: u8) -> Self {
        if let Codec::H264(h) = &mut self.config.codec {
            h.payload_type = pt;
        }
        self
    }

    pub fn queue_max_ms(mut self, ms: u32) -> Self {
        self.config.queue_max_ms = ms;
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.config.live = live;
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.config.block = block;
        self
    }

    pub fn min_latency_ms(mut self, ms: u32) -> Self {
        self.config.min_latency_ms = ms;
        self
    }

    pub fn build(self) -> Result<PipelineConfig, XStreamError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Tests ────────────────────────────────────────────────────────
