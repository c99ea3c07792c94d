//! Background delivery server.
//!
//! [`DeliveryServer::start`] creates one [`Endpoint`] per region, spawns a
//! named thread running a current-thread Tokio runtime, starts the
//! transport there and then dispatches demand signals until stopped.
//!
//! ```text
//!   consumers / transport          delivery thread
//!  ┌───────────────────┐  Signal  ┌──────────────────────────┐
//!  │ DeliveryControl   │ ───────► │ event loop               │
//!  │  need_data(name)  │  mpsc    │  endpoints[name].on_*()  │
//!  │  enough_data(..)  │          │                          │
//!  │  attach / detach  │          │  cancel ─► stop all,     │
//!  └───────────────────┘          │            transport.stop│
//!                                 └──────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::capture::Region;
use crate::error::XStreamError;
use crate::stream::endpoint::{Endpoint, EndpointState, EndpointStats, SharedStatus};
use crate::stream::pipeline::{PipelineConfig, VideoCaps};
use crate::stream::transport::{FrameSink, MountSpec, Transport};

const THREAD_NAME: &str = "xstream-delivery";

// ── Signal ───────────────────────────────────────────────────────

enum Signal {
    NeedData(String),
    EnoughData(String),
    Attach(String, Box<dyn FrameSink>),
    Detach(String),
    Barrier(oneshot::Sender<()>),
}

// ── DeliveryControl ──────────────────────────────────────────────

/// Cloneable handle for sending demand signals to the delivery thread.
///
/// Names may be given with or without the leading `/` of the mount path.
#[derive(Clone)]
pub struct DeliveryControl {
    tx: mpsc::UnboundedSender<Signal>,
    status: Arc<BTreeMap<String, SharedStatus>>,
}

impl DeliveryControl {
    fn resolve(&self, name: &str) -> Result<String, XStreamError> {
        let name = name.trim_start_matches('/');
        if self.status.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(XStreamError::UnknownEndpoint(name.to_string()))
        }
    }

    /// The consumer of `name` is ready for one frame.
    pub fn need_data(&self, name: &str) -> Result<(), XStreamError> {
        let name = self.resolve(name)?;
        self.tx.send(Signal::NeedData(name))?;
        Ok(())
    }

    /// The consumer of `name` wants no frames until its next need-data.
    pub fn enough_data(&self, name: &str) -> Result<(), XStreamError> {
        let name = self.resolve(name)?;
        self.tx.send(Signal::EnoughData(name))?;
        Ok(())
    }

    /// Connect `sink` as the consumer of `name`.
    pub fn attach<S>(&self, name: &str, sink: S) -> Result<(), XStreamError>
    where
        S: FrameSink + 'static,
    {
        let name = self.resolve(name)?;
        self.tx.send(Signal::Attach(name, Box::new(sink)))?;
        Ok(())
    }

    pub fn detach(&self, name: &str) -> Result<(), XStreamError> {
        let name = self.resolve(name)?;
        self.tx.send(Signal::Detach(name))?;
        Ok(())
    }

    /// Block until every signal sent before this call has been processed.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context; use
    /// [`barrier_async`](Self::barrier_async) there.
    pub fn barrier(&self) -> Result<(), XStreamError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Signal::Barrier(tx))?;
        rx.blocking_recv().map_err(|_| XStreamError::ChannelClosed)
    }

    pub async fn barrier_async(&self) -> Result<(), XStreamError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Signal::Barrier(tx))?;
        rx.await.map_err(|_| XStreamError::ChannelClosed)
    }

    pub fn state(&self, name: &str) -> Option<EndpointState> {
        self.status
            .get(name.trim_start_matches('/'))
            .map(|s| s.lock().state)
    }

    pub fn stats(&self, name: &str) -> Option<EndpointStats> {
        self.status
            .get(name.trim_start_matches('/'))
            .map(|s| s.lock().stats)
    }

    /// Endpoint names, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        self.status.keys().cloned().collect()
    }
}

impl std::fmt::Debug for DeliveryControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryControl")
            .field("endpoints", &self.status.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── DeliveryServer ───────────────────────────────────────────────

/// Owns the delivery thread. Dropping the server stops it.
pub struct DeliveryServer {
    control: DeliveryControl,
    mounts: Vec<MountSpec>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl DeliveryServer {
    /// Start delivering `regions` through `transport`.
    ///
    /// Returns once the transport has started on the delivery thread, or
    /// with [`XStreamError::DeliverySetupFailure`] if anything on the way
    /// failed.
    pub fn start<'a, I>(
        regions: I,
        mut transport: Box<dyn Transport>,
        pipeline: PipelineConfig,
    ) -> Result<Self, XStreamError>
    where
        I: IntoIterator<Item = &'a Region>,
    {
        pipeline
            .validate()
            .map_err(|e| XStreamError::DeliverySetupFailure(e.to_string()))?;

        let mut endpoints = BTreeMap::new();
        let mut mounts = Vec::new();
        for region in regions {
            let endpoint = Endpoint::new(region.name(), Arc::clone(region.slot()));
            mounts.push(MountSpec {
                path: endpoint.path(),
                caps: VideoCaps::rgba(region.layout().width, region.layout().height),
                pipeline: pipeline.clone(),
            });
            if endpoints.insert(region.name().to_string(), endpoint).is_some() {
                return Err(XStreamError::DeliverySetupFailure(format!(
                    "duplicate endpoint name {:?}",
                    region.name()
                )));
            }
        }
        if endpoints.is_empty() {
            tracing::warn!("delivery starting with no endpoints");
        }

        let status: BTreeMap<_, _> = endpoints
            .iter()
            .map(|(name, ep)| (name.clone(), ep.status()))
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        let control = DeliveryControl {
            tx,
            status: Arc::new(status),
        };
        let cancel = CancellationToken::new();

        // The caller may itself be inside a runtime, so the handshake
        // uses a std channel rather than a blocking oneshot.
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), XStreamError>>(1);

        let thread = {
            let control = control.clone();
            let cancel = cancel.clone();
            let mounts = mounts.clone();
            std::thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            let _ = ready_tx.send(Err(XStreamError::DeliverySetupFailure(format!(
                                "runtime: {e}"
                            ))));
                            return;
                        }
                    };

                    // Transports may spawn onto the delivery runtime from `start`.
                    let started = {
                        let _guard = runtime.enter();
                        transport.start(&mounts, control)
                    };
                    if let Err(e) = started {
                        let _ = ready_tx.send(Err(XStreamError::DeliverySetupFailure(format!(
                            "transport: {e}"
                        ))));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    runtime.block_on(run_loop(rx, endpoints, cancel));
                    let _guard = runtime.enter();
                    transport.stop();
                    tracing::debug!("delivery thread exiting");
                })
                .map_err(|e| XStreamError::DeliverySetupFailure(format!("spawn: {e}")))?
        };

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(XStreamError::DeliverySetupFailure(
                "delivery thread exited during startup".into(),
            ))
        });
        if let Err(e) = ready {
            let _ = thread.join();
            tracing::error!("{e}");
            return Err(e);
        }

        tracing::info!(
            endpoints = mounts.len(),
            paths = ?mounts.iter().map(|m| m.path.as_str()).collect::<Vec<_>>(),
            "delivery server started"
        );
        Ok(Self {
            control,
            mounts,
            cancel,
            thread: Some(thread),
        })
    }

    /// A handle for sending signals.
    pub fn control(&self) -> DeliveryControl {
        self.control.clone()
    }

    pub fn mounts(&self) -> &[MountSpec] {
        &self.mounts
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.cancel.is_cancelled()
    }

    /// End the event loop and wait for the delivery thread to exit.
    ///
    /// Every endpoint is `Stopped` afterwards. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.cancel.cancel();
        if thread.join().is_err() {
            tracing::error!("delivery thread panicked");
        }
        tracing::info!("delivery server stopped");
    }
}

impl Drop for DeliveryServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DeliveryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryServer")
            .field("mounts", &self.mounts.len())
            .field("running", &self.is_running())
            .finish()
    }
}

// ── Event loop ───────────────────────────────────────────────────

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<Signal>,
    mut endpoints: BTreeMap<String, Endpoint>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(signal) => dispatch(&mut endpoints, signal),
                None => break,
            },
        }
    }

    for endpoint in endpoints.values_mut() {
        endpoint.stop();
    }
}

fn dispatch(endpoints: &mut BTreeMap<String, Endpoint>, signal: Signal) {
    let (name, result) = match signal {
        Signal::Barrier(done) => {
            let _ = done.send(());
            return;
        }
        Signal::NeedData(name) => {
            let Some(ep) = endpoints.get_mut(&name) else { return };
            match ep.on_need_data() {
                Ok(true) => return,
                Ok(false) => {
                    tracing::debug!(endpoint = %name, "need-data with no consumer attached");
                    return;
                }
                Err(e) => (name, Err(e)),
            }
        }
        Signal::EnoughData(name) => {
            let Some(ep) = endpoints.get_mut(&name) else { return };
            tracing::debug!(endpoint = %name, "enough-data");
            let result = ep.on_enough_data();
            (name, result)
        }
        Signal::Attach(name, sink) => {
            let Some(ep) = endpoints.get_mut(&name) else { return };
            tracing::info!(endpoint = %name, "consumer attached");
            let result = ep.attach(sink);
            (name, result)
        }
        Signal::Detach(name) => {
            let Some(ep) = endpoints.get_mut(&name) else { return };
            tracing::info!(endpoint = %name, "consumer detached");
            let result = ep.detach();
            (name, result)
        }
    };

    match result {
        Ok(()) => {}
        Err(e @ XStreamError::FrameDeliveryError { .. }) => {
            tracing::error!(endpoint = %name, "{e}");
        }
        Err(e) => tracing::debug!(endpoint = %name, "{e}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegionLayout;
    use crate::error::FlowError;
    use crate::stream::transport::{Frame, NullTransport};
    use bytes::Bytes;
    use parking_lot::Mutex;

    fn region(name: &str) -> Region {
        Region::new(RegionLayout {
            name: name.into(),
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        })
    }

    fn start(regions: &[Region]) -> DeliveryServer {
        DeliveryServer::start(regions, Box::new(NullTransport), PipelineConfig::default()).unwrap()
    }

    fn recorder() -> (impl FrameSink + 'static, Arc<Mutex<Vec<Frame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&frames);
        let sink = move |f: Frame| {
            out.lock().push(f);
            Ok::<(), FlowError>(())
        };
        (sink, frames)
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn start(&mut self, _: &[MountSpec], _: DeliveryControl) -> Result<(), XStreamError> {
            Err("no server socket".into())
        }
    }

    #[test]
    fn mounts_one_path_per_region() {
        let regions = [region("pfd"), region("nd")];
        let server = start(&regions);
        let paths: Vec<_> = server.mounts().iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/pfd", "/nd"]);
        assert_eq!(server.control().endpoints(), vec!["nd", "pfd"]);
        assert_eq!(server.mounts()[0].caps, VideoCaps::rgba(1, 1));
    }

    struct SpawningTransport;

    impl Transport for SpawningTransport {
        fn start(&mut self, mounts: &[MountSpec], control: DeliveryControl) -> Result<(), XStreamError> {
            let name = mounts[0].name().to_string();
            tokio::spawn(async move {
                let _ = control.need_data(&name);
            });
            Ok(())
        }
    }

    #[test]
    fn transport_can_spawn_on_delivery_runtime() {
        let regions = [region("pfd")];
        let server = DeliveryServer::start(&regions, Box::new(SpawningTransport), PipelineConfig::default())
            .unwrap();
        let control = server.control();

        for _ in 0..200 {
            if control.stats("pfd").unwrap().need_data == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(control.stats("pfd").unwrap().need_data, 1);
        assert!(server.is_running());
    }

    #[test]
    fn transport_failure_is_setup_failure() {
        let regions = [region("pfd")];
        let err = DeliveryServer::start(&regions, Box::new(FailingTransport), PipelineConfig::default())
            .unwrap_err();
        assert!(matches!(err, XStreamError::DeliverySetupFailure(_)));
        assert!(err.to_string().contains("no server socket"));
    }

    #[test]
    fn invalid_pipeline_is_setup_failure() {
        let regions = [region("pfd")];
        let pipeline = PipelineConfig {
            queue_max_ms: 0,
            ..PipelineConfig::default()
        };
        let err = DeliveryServer::start(&regions, Box::new(NullTransport), pipeline).unwrap_err();
        assert!(matches!(err, XStreamError::DeliverySetupFailure(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let regions = [region("pfd"), region("pfd")];
        let err = DeliveryServer::start(&regions, Box::new(NullTransport), PipelineConfig::default())
            .unwrap_err();
        assert!(matches!(err, XStreamError::DeliverySetupFailure(_)));
    }

    #[test]
    fn need_data_delivers_latest_publish() {
        let regions = [region("pfd")];
        let server = start(&regions);
        let control = server.control();
        let (sink, frames) = recorder();

        control.attach("/pfd", sink).unwrap();
        regions[0].slot().publish(Bytes::from_static(&[9, 8, 7, 6]));
        control.need_data("/pfd").unwrap();
        control.barrier().unwrap();

        assert_eq!(control.state("pfd"), Some(EndpointState::Producing));
        let frames = frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].data[..], &[9, 8, 7, 6]);
        assert_eq!(frames[0].endpoint, "pfd");
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let regions = [region("pfd")];
        let server = start(&regions);
        let err = server.control().need_data("/efis").unwrap_err();
        assert!(matches!(err, XStreamError::UnknownEndpoint(name) if name == "efis"));
    }

    #[test]
    fn stop_joins_and_stops_every_endpoint() {
        let regions = [region("pfd"), region("nd")];
        let mut server = start(&regions);
        let control = server.control();
        let (sink, frames) = recorder();
        control.attach("pfd", sink).unwrap();
        control.need_data("pfd").unwrap();
        control.barrier().unwrap();

        server.stop();
        assert!(!server.is_running());
        assert_eq!(control.state("pfd"), Some(EndpointState::Stopped));
        assert_eq!(control.state("nd"), Some(EndpointState::Stopped));

        // The loop is gone; nothing else is delivered.
        assert!(matches!(control.need_data("pfd"), Err(XStreamError::ChannelClosed)));
        assert_eq!(frames.lock().len(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn barrier_works_from_async_code() {
        let regions = [region("pfd")];
        let server = start(&regions);
        let control = server.control();
        control.need_data("pfd").unwrap();
        control.barrier_async().await.unwrap();
        assert_eq!(control.stats("pfd").unwrap().need_data, 1);
    }
}
