//! Replay service core logic.
//!
//! Loads the catalog and the dumped buffers, starts streaming through the
//! snapshot transport and then plays the host's part: a frame tick at
//! `tick_rate` Hz until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use xstream_core::{Catalog, StreamController, XStreamError};

use crate::config::ServerConfig;
use crate::replay::ReplaySource;
use crate::transport::SnapshotTransport;

// ── ReplayService ────────────────────────────────────────────────

pub struct ReplayService {
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl ReplayService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Build a controller over the replayed buffers.
    pub fn controller(&self) -> Result<StreamController, XStreamError> {
        let catalog = Catalog::load(&self.config.catalog.path)?;
        let replay = ReplaySource::load(&self.config.replay.dump_dir)?;
        let identity = replay.identity(&self.config.replay);
        info!(author = %identity.author, type_code = %identity.type_code, "replay identity");

        Ok(StreamController::new(
            catalog,
            self.config.to_controller_settings(&self.config.replay.dump_dir),
            replay.host,
            Arc::new(identity),
        ))
    }

    /// Run until stopped.
    ///
    /// 1. Discovers the source buffer among the replayed dumps.
    /// 2. Starts delivery with one consumer per endpoint.
    /// 3. Ticks the controller at the configured rate.
    /// 4. Stops streaming (joining the delivery thread) on exit.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        // Raised before startup so a stop during discovery is not lost.
        self.running.store(true, Ordering::SeqCst);
        let mut controller = match self.start_controller() {
            Ok(controller) => controller,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        if !self.running.load(Ordering::SeqCst) {
            info!("stop requested during startup");
        }

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => controller.on_frame(started.elapsed().as_secs_f64()),
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        if let Some(control) = controller.control() {
            for name in control.endpoints() {
                if let Some(stats) = control.stats(&name) {
                    info!(
                        endpoint = %name,
                        need_data = stats.need_data,
                        delivered = stats.frames_delivered,
                        errors = stats.delivery_errors,
                        "endpoint summary"
                    );
                }
            }
        }
        info!(read_backs = controller.read_backs(), "stopping");
        controller.stop_stream();

        self.running.store(false, Ordering::SeqCst);
        info!("replay service stopped");
        Ok(())
    }

    fn start_controller(&self) -> Result<StreamController, XStreamError> {
        let mut controller = self.controller()?;
        let transport = SnapshotTransport::new(self.config.consumer.clone());
        controller.try_start_stream(Box::new(transport))?;
        Ok(controller)
    }

    /// One-shot dump of every large replayed buffer into `dir`.
    pub fn dump(&self, dir: &std::path::Path) -> Result<usize, XStreamError> {
        let replay = ReplaySource::load(&self.config.replay.dump_dir)?;
        let settings = self.config.to_controller_settings(dir);
        let written = xstream_core::capture::dump_candidates(
            replay.host.as_ref(),
            settings.scan,
            settings.min_dump_size,
            dir,
            settings.compress_dumps,
        )?;
        if written.is_empty() {
            warn!("no buffer reached the minimum dump size");
        }
        Ok(written.len())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use xstream_core::TextureId;
    use xstream_core::capture::{DumpFile, write_dump};

    const CATALOG: &str = r#"
        [[vehicle]]
        author = "*"
        type_codes = ["A320"]

        [[vehicle.signatures]]
        width = 8
        height = 8
        pattern = [0, 0, 0, 255]

        [[vehicle.signatures.regions]]
        name = "pfd"
        x = 0
        y = 0
        width = 4
        height = 4
    "#;

    fn setup(root: &Path) -> ServerConfig {
        let dumps = root.join("dump");
        let mut px = vec![0x33u8; 8 * 8 * 4];
        px[..4].copy_from_slice(&[0, 0, 0, 255]);
        write_dump(&dumps, &DumpFile::new("A320", TextureId(21), 8, 8, false), &px).unwrap();
        std::fs::write(root.join("catalog.toml"), CATALOG).unwrap();

        let mut config = ServerConfig::default();
        config.catalog.path = root.join("catalog.toml");
        config.replay.dump_dir = dumps;
        config.consumer.output_dir = root.join("frames");
        config.consumer.fps = 100.0;
        config.capture.tick_rate = 100;
        config
    }

    #[test]
    fn service_creates_stopped() {
        let svc = ReplayService::new(ServerConfig::default());
        assert!(!svc.is_running());
        let handle = svc.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[test]
    fn controller_discovers_replayed_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReplayService::new(setup(dir.path()));
        let mut controller = svc.controller().unwrap();
        assert_eq!(controller.find_displays().unwrap(), 1);
        assert_eq!(controller.regions()[0].0, "pfd");
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.catalog.path = dir.path().join("nope.toml");
        assert!(ReplayService::new(config).controller().is_err());
    }

    #[tokio::test]
    async fn run_streams_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReplayService::new(setup(dir.path()));
        let stop = svc.stop_handle();
        let frame = dir.path().join("frames").join("pfd_4x4.rgba");

        let watcher = {
            let frame = frame.clone();
            tokio::spawn(async move {
                for _ in 0..300 {
                    if frame.exists() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                // Let at least one captured frame through.
                tokio::time::sleep(Duration::from_millis(100)).await;
                stop.store(false, Ordering::SeqCst);
            })
        };

        svc.run().await.unwrap();
        watcher.await.unwrap();
        assert_eq!(std::fs::read(&frame).unwrap().len(), 4 * 4 * 4);
        assert!(!svc.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_raised_during_startup_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReplayService::new(setup(dir.path()));
        let stop = svc.stop_handle();

        // Stops as soon as the run is marked running, which is before
        // discovery and delivery startup have finished.
        let watcher = std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            stop.store(false, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(5), svc.run())
            .await
            .expect("run did not observe the stop")
            .unwrap();
        watcher.join().unwrap();
        assert!(!svc.is_running());
    }

    #[test]
    fn failed_startup_clears_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.catalog.path = dir.path().join("nope.toml");
        let svc = ReplayService::new(config);
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        assert!(rt.block_on(svc.run()).is_err());
        assert!(!svc.is_running());
    }

    #[test]
    fn dump_rewrites_large_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.capture.min_dump_width = 8;
        config.capture.min_dump_height = 8;
        config.capture.compress_dumps = true;
        let out = dir.path().join("redump");

        assert_eq!(ReplayService::new(config).dump(&out).unwrap(), 1);
        assert!(out.join("texture_dump_21_8x8.dat.zst").exists());
    }
}
