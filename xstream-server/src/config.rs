//! Configuration for the replay service.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xstream_core::capture::{DEFAULT_CAPTURE_INTERVAL, DEFAULT_MIN_DUMP_SIZE};
use xstream_core::{ControllerSettings, PipelineConfig, ScanRange};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Signature catalog location.
    pub catalog: CatalogConfig,
    /// Discovery and capture settings.
    pub capture: CaptureConfig,
    /// Encode pipeline handed to the transport for every mount.
    pub stream: PipelineConfig,
    /// Where replayed buffers come from and who they belong to.
    pub replay: ReplayConfig,
    /// Built-in consumers that pull frames to disk.
    pub consumer: ConsumerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Catalog location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// `.toml` or `.json` catalog file.
    pub path: PathBuf,
}

/// Discovery and capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum seconds between captures.
    pub interval_secs: f64,
    /// First candidate id scanned.
    pub scan_first: u32,
    /// Last candidate id scanned (inclusive).
    pub scan_last: u32,
    /// Simulated host frame rate driving capture ticks.
    pub tick_rate: u32,
    /// Smallest buffer written by `--dump`.
    pub min_dump_width: u32,
    pub min_dump_height: u32,
    /// zstd-compress dumps.
    pub compress_dumps: bool,
}

/// Replay source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory of `texture_<tag>_<id>_<w>x<h>.dat[.zst]` dumps.
    pub dump_dir: PathBuf,
    /// Author string reported to identity matching.
    pub author: String,
    /// Type code reported to identity matching. If empty, the tag of the
    /// first non-candidate dump is used.
    pub type_code: String,
}

/// Built-in frame consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Start one consumer per endpoint.
    pub enabled: bool,
    /// Directory the latest frame of each endpoint is written to.
    pub output_dir: PathBuf,
    /// Pull rate per consumer, frames per second.
    pub fps: f64,
    /// Endpoint names to consume; empty means all.
    pub endpoints: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.toml"),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let scan = ScanRange::default();
        Self {
            interval_secs: DEFAULT_CAPTURE_INTERVAL,
            scan_first: scan.first(),
            scan_last: scan.last(),
            tick_rate: 30,
            min_dump_width: DEFAULT_MIN_DUMP_SIZE.0,
            min_dump_height: DEFAULT_MIN_DUMP_SIZE.1,
            compress_dumps: false,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dump_dir: PathBuf::from("dump"),
            author: "replay".into(),
            type_code: String::new(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("frames"),
            fps: 10.0,
            endpoints: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
///
/// `load` runs before the subscriber exists, so the caller logs this
/// once tracing is initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file.
    File,
    /// No readable file; defaults.
    Missing,
    /// The file was rejected; defaults. Holds the reason.
    Invalid(String),
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return (Self::default(), ConfigSource::Missing);
        };
        let parsed = toml::from_str::<Self>(&contents)
            .map_err(|e| e.to_string())
            .and_then(|cfg| {
                cfg.stream.validate().map_err(|e| e.to_string())?;
                Ok(cfg)
            });
        match parsed {
            Ok(cfg) => (cfg, ConfigSource::File),
            Err(e) => (Self::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Scan range, falling back to the default when the bounds are reversed.
    pub fn scan_range(&self) -> ScanRange {
        ScanRange::new(self.capture.scan_first, self.capture.scan_last).unwrap_or_else(|e| {
            tracing::warn!("{e}; scanning the default range");
            ScanRange::default()
        })
    }

    /// Convert into controller settings, clamping out-of-range values.
    pub fn to_controller_settings(&self, dump_dir: &Path) -> ControllerSettings {
        ControllerSettings {
            scan: self.scan_range(),
            capture_interval: self.capture_interval(),
            pipeline: self.stream.clone(),
            dump_dir: dump_dir.to_path_buf(),
            compress_dumps: self.capture.compress_dumps,
            min_dump_size: (
                self.capture.min_dump_width.max(1),
                self.capture.min_dump_height.max(1),
            ),
        }
    }

    /// `interval_secs` clamped to 0.01..=60; non-finite values use the default.
    fn capture_interval(&self) -> f64 {
        let secs = self.capture.interval_secs;
        if !secs.is_finite() {
            tracing::warn!("capture interval {secs} is not finite; using {DEFAULT_CAPTURE_INTERVAL}s");
            return DEFAULT_CAPTURE_INTERVAL;
        }
        secs.clamp(0.01, 60.0)
    }

    /// Host tick period derived from `tick_rate` (1..=240 Hz).
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.capture.tick_rate.clamp(1, 240)))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use xstream_core::stream::Codec;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert!(text.contains("interval_secs"));
        assert!(text.contains("queue_max_ms"));
        assert!(text.contains("dump_dir"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.capture.scan_last, 999);
        assert_eq!(parsed.stream, PipelineConfig::default());
        assert_eq!(parsed.consumer.fps, 10.0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ServerConfig = toml::from_str(
            r#"
            [stream.codec]
            kind = "mjpeg"
            quality = 70

            [replay]
            type_code = "A321"
            "#,
        )
        .unwrap();
        assert!(matches!(parsed.stream.codec, Codec::Mjpeg(ref m) if m.quality == 70));
        assert_eq!(parsed.replay.type_code, "A321");
        assert_eq!(parsed.replay.author, "replay");
        assert_eq!(parsed.capture.tick_rate, 30);
    }

    #[test]
    fn invalid_pipeline_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xstream.toml");
        std::fs::write(&path, "[stream]\nqueue_max_ms = 0\n").unwrap();
        let (cfg, source) = ServerConfig::load(&path);
        assert_eq!(cfg.stream.queue_max_ms, 500);
        assert!(matches!(source, ConfigSource::Invalid(reason) if reason.contains("queue_max_ms")));
    }

    #[test]
    fn to_controller_settings_clamps() {
        let mut cfg = ServerConfig::default();
        cfg.capture.interval_secs = 0.0;
        cfg.capture.scan_first = 50;
        cfg.capture.scan_last = 10;
        let settings = cfg.to_controller_settings(Path::new("out"));
        assert_eq!(settings.capture_interval, 0.01);
        assert_eq!(settings.scan, ScanRange::default());
        assert_eq!(settings.dump_dir, PathBuf::from("out"));
    }

    #[test]
    fn write_default_bootstraps_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xstream.toml");
        ServerConfig::write_default(&path).unwrap();
        let (cfg, source) = ServerConfig::load(&path);
        assert_eq!(source, ConfigSource::File);
        assert_eq!(cfg.capture.tick_rate, 30);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, source) = ServerConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(source, ConfigSource::Missing);
        assert_eq!(cfg.catalog.path, PathBuf::from("catalog.toml"));
    }

    #[test]
    fn non_finite_interval_uses_default() {
        let mut cfg = ServerConfig::default();
        cfg.capture.interval_secs = f64::NAN;
        let settings = cfg.to_controller_settings(Path::new("out"));
        assert_eq!(settings.capture_interval, DEFAULT_CAPTURE_INTERVAL);

        cfg.capture.interval_secs = f64::INFINITY;
        let settings = cfg.to_controller_settings(Path::new("out"));
        assert_eq!(settings.capture_interval, DEFAULT_CAPTURE_INTERVAL);
    }
}
