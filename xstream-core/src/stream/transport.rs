//! Seams towards the external transport.
//!
//! The transport is the collaborator that actually serves streams
//! (RTSP server, file writer, test harness). It is started on the delivery
//! thread with one [`MountSpec`] per endpoint and a [`DeliveryControl`]
//! through which its consumers attach a [`FrameSink`] and send demand
//! signals.
//!
//! [`DeliveryControl`]: crate::stream::DeliveryControl

use bytes::Bytes;

use crate::error::{FlowError, XStreamError};
use crate::stream::pipeline::{PipelineConfig, VideoCaps};
use crate::stream::server::DeliveryControl;

/// One frame handed from an endpoint to its sink.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Endpoint (region) name.
    pub endpoint: String,
    pub width: u32,
    pub height: u32,
    /// Slot generation the payload was acquired at.
    pub generation: u64,
    /// Per-endpoint handoff counter, starting at 0.
    pub sequence: u64,
    /// `width * height * 4` bytes of RGBA, bottom row first.
    pub data: Bytes,
}

/// Consumer side of one endpoint.
pub trait FrameSink: Send {
    fn push(&mut self, frame: Frame) -> Result<(), FlowError>;
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) -> Result<(), FlowError> + Send,
{
    fn push(&mut self, frame: Frame) -> Result<(), FlowError> {
        self(frame)
    }
}

/// What the transport needs to publish one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MountSpec {
    /// `/<region-name>`.
    pub path: String,
    pub caps: VideoCaps,
    pub pipeline: PipelineConfig,
}

impl MountSpec {
    /// Endpoint name without the leading `/`.
    pub fn name(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

/// The external serving layer.
pub trait Transport: Send {
    /// Bring up the mounts. Called once, on the delivery thread, before
    /// any signal is processed. An error aborts delivery startup.
    fn start(&mut self, mounts: &[MountSpec], control: DeliveryControl) -> Result<(), XStreamError>;

    /// Tear down. Called on the delivery thread after the event loop ends.
    fn stop(&mut self) {}
}

/// A transport that mounts nothing; consumers drive the
/// [`DeliveryControl`] directly.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn start(&mut self, mounts: &[MountSpec], _control: DeliveryControl) -> Result<(), XStreamError> {
        tracing::debug!(mounts = mounts.len(), "null transport started");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
