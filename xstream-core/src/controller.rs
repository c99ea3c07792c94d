//! The stream controller: one context object owning the whole data path.
//!
//! Host glue constructs a [`StreamController`] once, forwards its frame
//! callback to [`on_frame`](StreamController::on_frame) and its menu
//! actions to [`start_stream`](StreamController::start_stream),
//! [`stop_stream`](StreamController::stop_stream) and the dump methods.
//!
//! ```text
//!  IdentitySource ─► IdentityMatcher ─► BufferDiscoverer ─► RegionSlicer
//!                                                               │ FrameSlot
//!                                                               ▼
//!                                 Transport ◄── DeliveryServer (endpoints)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::{
    BufferDiscoverer, DEFAULT_CAPTURE_INTERVAL, DEFAULT_MIN_DUMP_SIZE, FrameSlot, RegionSlicer,
    ScanRange, TextureHost, TickDispatcher, TickId, TickOutcome, dump_candidates, dump_sources,
};
use crate::catalog::{Catalog, IdentityMatcher, IdentitySource};
use crate::error::XStreamError;
use crate::stream::{DeliveryControl, DeliveryServer, PipelineConfig, Transport};

// ── ControllerSettings ───────────────────────────────────────────

/// Tunables for [`StreamController`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Candidate ids scanned during discovery.
    pub scan: ScanRange,
    /// Minimum host seconds between captures.
    pub capture_interval: f64,
    /// Encode pipeline handed to the transport for every mount.
    pub pipeline: PipelineConfig,
    /// Where dumps are written.
    pub dump_dir: PathBuf,
    pub compress_dumps: bool,
    /// Smallest buffer written by candidate dumps.
    pub min_dump_size: (u32, u32),
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            scan: ScanRange::default(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            pipeline: PipelineConfig::default(),
            dump_dir: PathBuf::from("dump"),
            compress_dumps: false,
            min_dump_size: DEFAULT_MIN_DUMP_SIZE,
        }
    }
}

// ── StreamController ─────────────────────────────────────────────

pub struct StreamController {
    catalog: Catalog,
    settings: ControllerSettings,
    host: Arc<dyn TextureHost>,
    identity: Arc<dyn IdentitySource>,
    dispatcher: TickDispatcher,
    slicer: Arc<Mutex<Option<RegionSlicer>>>,
    tick: Option<TickId>,
    delivery: Option<DeliveryServer>,
    definition: Option<String>,
}

impl StreamController {
    pub fn new(
        catalog: Catalog,
        settings: ControllerSettings,
        host: Arc<dyn TextureHost>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        Self {
            catalog,
            settings,
            host,
            identity,
            dispatcher: TickDispatcher::new(),
            slicer: Arc::new(Mutex::new(None)),
            tick: None,
            delivery: None,
            definition: None,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Frame-tick handlers; host glue may register its own here too.
    pub fn dispatcher(&mut self) -> &mut TickDispatcher {
        &mut self.dispatcher
    }

    /// Label of the definition the current sources were discovered with.
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.delivery.is_some()
    }

    /// Signal handle of the running delivery server.
    pub fn control(&self) -> Option<DeliveryControl> {
        self.delivery.as_ref().map(DeliveryServer::control)
    }

    /// `(name, slot)` of every discovered region.
    pub fn regions(&self) -> Vec<(String, Arc<FrameSlot>)> {
        self.slicer
            .lock()
            .as_ref()
            .map(|s| {
                s.regions()
                    .map(|r| (r.name().to_string(), Arc::clone(r.slot())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read-backs performed by capture ticks so far.
    pub fn read_backs(&self) -> u64 {
        self.slicer.lock().as_ref().map_or(0, RegionSlicer::read_backs)
    }

    // ── Discovery ────────────────────────────────────────────────

    /// Resolve the current identity and discover its source buffer.
    ///
    /// Does nothing if sources are already known. Returns the number of
    /// regions available.
    pub fn find_displays(&mut self) -> Result<usize, XStreamError> {
        if let Some(slicer) = self.slicer.lock().as_ref() {
            return Ok(slicer.regions().count());
        }

        let author = self.identity.author();
        let type_code = self.identity.type_code();
        tracing::info!(author = %author, type_code = %type_code, "finding displays");

        let definition = IdentityMatcher::new(&self.catalog).resolve(&author, &type_code)?;
        let found = BufferDiscoverer::new(definition, self.settings.scan).discover(self.host.as_ref())?;

        let slicer = RegionSlicer::new(vec![found.source], self.settings.capture_interval);
        let count = slicer.regions().count();
        for region in slicer.regions() {
            let l = region.layout();
            tracing::info!(
                region = %l.name,
                x = l.x,
                y = l.y,
                width = l.width,
                height = l.height,
                "display"
            );
        }

        self.definition = Some(definition.label.clone());
        *self.slicer.lock() = Some(slicer);
        Ok(count)
    }

    // ── Streaming ────────────────────────────────────────────────

    /// Discover (if needed), start delivery through `transport` and begin
    /// capturing on frame ticks.
    ///
    /// Already streaming is not an error.
    pub fn try_start_stream(&mut self, transport: Box<dyn Transport>) -> Result<(), XStreamError> {
        if self.is_streaming() {
            tracing::debug!("already streaming");
            return Ok(());
        }
        self.find_displays()?;

        let server = {
            let guard = self.slicer.lock();
            let Some(slicer) = guard.as_ref() else {
                return Err(XStreamError::Other("sources released during start".into()));
            };
            let server = DeliveryServer::start(slicer.regions(), transport, self.settings.pipeline.clone())?;
            slicer.start();
            server
        };
        self.delivery = Some(server);

        let slicer = Arc::clone(&self.slicer);
        let tick = self.dispatcher.register(move |host, now| {
            if let Some(slicer) = slicer.lock().as_mut() {
                if let TickOutcome::Captured { regions } = slicer.tick(host, now) {
                    tracing::trace!(regions, "regions refreshed");
                }
            }
        });
        self.tick = Some(tick);

        tracing::info!(definition = ?self.definition, "streaming started");
        Ok(())
    }

    /// [`try_start_stream`](Self::try_start_stream), reporting failure as
    /// `false` after logging it.
    pub fn start_stream(&mut self, transport: Box<dyn Transport>) -> bool {
        match self.try_start_stream(transport) {
            Ok(()) => true,
            Err(e @ (XStreamError::DefinitionNotFound { .. } | XStreamError::BufferNotFound { .. })) => {
                tracing::warn!("cannot stream: {e}");
                false
            }
            Err(e) => {
                tracing::error!("cannot stream: {e}");
                false
            }
        }
    }

    /// Stop capturing, shut delivery down and release the sources.
    pub fn stop_stream(&mut self) {
        if let Some(slicer) = self.slicer.lock().as_ref() {
            slicer.stop();
        }
        if let Some(tick) = self.tick.take() {
            self.dispatcher.unregister(tick);
        }
        if let Some(mut server) = self.delivery.take() {
            server.stop();
        }
        if self.slicer.lock().take().is_some() {
            tracing::info!("sources released");
        }
        self.definition = None;
    }

    /// One host frame at host time `now` (seconds).
    pub fn on_frame(&mut self, now: f64) {
        self.dispatcher.fire(self.host.as_ref(), now);
    }

    // ── Debug export ─────────────────────────────────────────────

    /// Dump the discovered sources, tagged with the current type code.
    pub fn dump_sources(&self) -> Result<Vec<PathBuf>, XStreamError> {
        let guard = self.slicer.lock();
        let Some(slicer) = guard.as_ref() else {
            tracing::info!("no sources discovered, nothing to dump");
            return Ok(Vec::new());
        };
        dump_sources(
            self.host.as_ref(),
            slicer.sources(),
            &self.settings.dump_dir,
            &self.identity.type_code(),
            self.settings.compress_dumps,
        )
    }

    /// Dump every large buffer in the scan range.
    pub fn dump_candidates(&self) -> Result<Vec<PathBuf>, XStreamError> {
        dump_candidates(
            self.host.as_ref(),
            self.settings.scan,
            self.settings.min_dump_size,
            &self.settings.dump_dir,
            self.settings.compress_dumps,
        )
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

impl std::fmt::Debug for StreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamController")
            .field("definitions", &self.catalog.len())
            .field("definition", &self.definition)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemoryHost, TextureId};
    use crate::catalog::StaticIdentity;
    use crate::stream::{EndpointState, NullTransport};

    const CATALOG: &str = r#"
        [[vehicle]]
        label = "a32x"
        author = "airbus*"
        type_codes = ["A320", "A321"]

        [[vehicle.signatures]]
        width = 16
        height = 16
        pattern = [0, 0, 0, 255]

        [[vehicle.signatures.regions]]
        name = "pfd"
        x = 0
        y = 0
        width = 8
        height = 8

        [[vehicle.signatures.regions]]
        name = "nd"
        x = 8
        y = 0
        width = 8
        height = 8
    "#;

    fn setup(type_code: &str) -> (StreamController, Arc<MemoryHost>) {
        let host = Arc::new(MemoryHost::new());
        let mut px = vec![0x42u8; 16 * 16 * 4];
        px[..4].copy_from_slice(&[0, 0, 0, 0xFF]);
        host.insert(TextureId(17), 16, 16, px).unwrap();

        let controller = StreamController::new(
            Catalog::from_toml_str(CATALOG).unwrap(),
            ControllerSettings::default(),
            host.clone(),
            Arc::new(StaticIdentity::new("airbusstudio", type_code)),
        );
        (controller, host)
    }

    #[test]
    fn unknown_identity_does_not_stream() {
        let (mut controller, host) = setup("B738");
        assert!(!controller.start_stream(Box::new(NullTransport)));
        assert!(!controller.is_streaming());
        assert_eq!(host.reads(), 0);
    }

    #[test]
    fn discovery_failure_does_not_stream() {
        let (mut controller, host) = setup("A320");
        host.remove(TextureId(17));
        let err = controller.try_start_stream(Box::new(NullTransport)).unwrap_err();
        assert!(matches!(err, XStreamError::BufferNotFound { .. }));
        assert!(controller.regions().is_empty());
    }

    #[test]
    fn discovery_runs_once() {
        let (mut controller, host) = setup("A320");
        assert_eq!(controller.find_displays().unwrap(), 2);
        assert_eq!(controller.find_displays().unwrap(), 2);
        assert_eq!(host.reads(), 1);
        assert_eq!(controller.definition(), Some("a32x"));
    }

    #[test]
    fn start_tick_stop_lifecycle() {
        let (mut controller, _host) = setup("A320");
        assert!(controller.start_stream(Box::new(NullTransport)));
        assert!(controller.start_stream(Box::new(NullTransport)));
        assert_eq!(controller.dispatcher().len(), 1);

        controller.on_frame(0.0);
        controller.on_frame(0.1);
        assert_eq!(controller.read_backs(), 1);
        let slots = controller.regions();
        assert!(slots.iter().all(|(_, s)| s.generation() == 1));

        let control = controller.control().unwrap();
        controller.stop_stream();
        assert!(!controller.is_streaming());
        assert!(controller.dispatcher().is_empty());
        assert!(controller.regions().is_empty());
        assert_eq!(control.state("pfd"), Some(EndpointState::Stopped));

        // Further ticks are no-ops.
        controller.on_frame(5.0);
        assert_eq!(slots[0].1.generation(), 1);
    }

    #[test]
    fn dumps_go_to_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _host) = setup("A320");
        controller.settings.dump_dir = dir.path().to_path_buf();
        controller.settings.min_dump_size = (16, 16);

        assert!(controller.dump_sources().unwrap().is_empty());
        controller.find_displays().unwrap();
        let written = controller.dump_sources().unwrap();
        assert!(written[0].ends_with("texture_A320_17_16x16.dat"));

        let written = controller.dump_candidates().unwrap();
        assert!(written[0].ends_with("texture_dump_17_16x16.dat"));
    }
}
