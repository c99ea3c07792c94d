//! Snapshot transport: one pulling consumer per mount, writing the most
//! recent frame of each endpoint to disk.
//!
//! Each consumer runs on its own thread and sends need-data at its own
//! pace, the way a network client would. The delivery thread hands frames
//! to a sink that overwrites `<output_dir>/<name>_<w>x<h>.rgba`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use xstream_core::{DeliveryControl, FlowError, Frame, MountSpec, Transport, XStreamError};

use crate::config::ConsumerConfig;

// ── FileSink ─────────────────────────────────────────────────────

/// Writes every frame it receives over the same file.
fn file_sink(dir: PathBuf) -> impl FnMut(Frame) -> Result<(), FlowError> + Send + 'static {
    move |frame: Frame| {
        let path = dir.join(format!("{}_{}x{}.rgba", frame.endpoint, frame.width, frame.height));
        std::fs::write(&path, &frame.data).map_err(|e| FlowError::Error(e.to_string()))?;
        tracing::trace!(
            endpoint = %frame.endpoint,
            sequence = frame.sequence,
            generation = frame.generation,
            "frame written"
        );
        Ok(())
    }
}

// ── SnapshotTransport ────────────────────────────────────────────

struct Consumer {
    name: String,
    thread: JoinHandle<()>,
}

pub struct SnapshotTransport {
    config: ConsumerConfig,
    running: Arc<AtomicBool>,
    consumers: Vec<Consumer>,
}

impl SnapshotTransport {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            consumers: Vec::new(),
        }
    }

    fn wanted(&self, mount: &MountSpec) -> bool {
        self.config.endpoints.is_empty() || self.config.endpoints.iter().any(|e| e == mount.name())
    }

    fn spawn_consumer(
        &self,
        mount: &MountSpec,
        control: DeliveryControl,
        output_dir: &Path,
    ) -> Result<Consumer, XStreamError> {
        let name = mount.name().to_string();
        control.attach(&name, file_sink(output_dir.to_path_buf()))?;

        let period = Duration::from_secs_f64(1.0 / self.config.fps.clamp(0.1, 240.0));
        let running = Arc::clone(&self.running);
        let thread = {
            let name = name.clone();
            std::thread::Builder::new()
                .name(format!("consumer-{name}"))
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        if let Err(e) = control.need_data(&name) {
                            tracing::debug!(endpoint = %name, "consumer exiting: {e}");
                            break;
                        }
                        std::thread::sleep(period);
                    }
                })?
        };
        Ok(Consumer { name, thread })
    }
}

impl Transport for SnapshotTransport {
    fn start(&mut self, mounts: &[MountSpec], control: DeliveryControl) -> Result<(), XStreamError> {
        if !self.config.enabled {
            tracing::info!("consumers disabled; mounts are idle");
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.output_dir)?;
        self.running.store(true, Ordering::SeqCst);

        let wanted: Vec<&MountSpec> = mounts.iter().filter(|m| self.wanted(m)).collect();
        for mount in wanted {
            tracing::info!(
                path = %mount.path,
                caps = %mount.caps,
                pipeline = %mount.pipeline.launch_description(&mount.caps),
                "mount"
            );
            let consumer = self.spawn_consumer(mount, control.clone(), &self.config.output_dir)?;
            self.consumers.push(consumer);
        }
        for missing in self
            .config
            .endpoints
            .iter()
            .filter(|e| !mounts.iter().any(|m| m.name() == e.as_str()))
        {
            tracing::warn!(endpoint = %missing, "configured endpoint has no mount");
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for consumer in self.consumers.drain(..) {
            if consumer.thread.join().is_err() {
                tracing::error!(endpoint = %consumer.name, "consumer thread panicked");
            }
        }
    }
}

impl Drop for SnapshotTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────
