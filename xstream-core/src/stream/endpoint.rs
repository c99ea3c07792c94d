//! Per-region delivery endpoint and its demand state machine.
//!
//! Endpoints live on the delivery thread and are only mutated by the
//! event loop. Their state and counters are mirrored into a shared
//! [`EndpointStatus`] so other threads can observe them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::FrameSlot;
use crate::error::XStreamError;
use crate::stream::transport::{Frame, FrameSink};

// ── EndpointState ────────────────────────────────────────────────

/// Demand state of one endpoint.
///
/// ```text
///  Idle ──need-data──► Producing ──enough-data──► Paused
///   ▲                    ▲   │                      │
///   │                    │   └──────────────────────┤
///   └──────detach────────┴────────need-data─────────┘
///
///  any ──stop──► Stopped (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// No consumer is pulling.
    #[default]
    Idle,
    /// Each need-data signal is answered with one frame.
    Producing,
    /// The consumer asked for a pause; nothing is handed off.
    Paused,
    /// The server shut down. Terminal.
    Stopped,
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Producing => write!(f, "Producing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

impl EndpointState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Producing`.
    ///
    /// Valid from: `Idle`, `Producing`, `Paused`.
    pub fn produce(&mut self) -> Result<(), XStreamError> {
        match self {
            Self::Idle | Self::Producing | Self::Paused => {
                *self = Self::Producing;
                Ok(())
            }
            Self::Stopped => Err(XStreamError::InvalidTransition(
                "cannot produce: endpoint is stopped",
            )),
        }
    }

    /// Transition to `Paused`.
    ///
    /// Valid from: `Producing`, `Paused`.
    pub fn pause(&mut self) -> Result<(), XStreamError> {
        match self {
            Self::Producing | Self::Paused => {
                *self = Self::Paused;
                Ok(())
            }
            Self::Idle => Err(XStreamError::InvalidTransition(
                "cannot pause: endpoint is idle",
            )),
            Self::Stopped => Err(XStreamError::InvalidTransition(
                "cannot pause: endpoint is stopped",
            )),
        }
    }

    /// Transition to `Idle`.
    ///
    /// Valid from any state except `Stopped`.
    pub fn reset(&mut self) -> Result<(), XStreamError> {
        match self {
            Self::Stopped => Err(XStreamError::InvalidTransition(
                "cannot reset: endpoint is stopped",
            )),
            _ => {
                *self = Self::Idle;
                Ok(())
            }
        }
    }

    /// Transition to `Stopped`. Always valid.
    pub fn stop(&mut self) {
        *self = Self::Stopped;
    }
}

// ── EndpointStatus ───────────────────────────────────────────────

/// Counters kept per endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub need_data: u64,
    pub frames_delivered: u64,
    pub delivery_errors: u64,
}

/// Externally visible snapshot of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStatus {
    pub state: EndpointState,
    pub stats: EndpointStats,
}

pub type SharedStatus = Arc<Mutex<EndpointStatus>>;

// ── Endpoint ─────────────────────────────────────────────────────

/// One addressable stream, backed by a region's [`FrameSlot`].
pub struct Endpoint {
    name: String,
    slot: Arc<FrameSlot>,
    state: EndpointState,
    sink: Option<Box<dyn FrameSink>>,
    /// Next handoff sequence number; advances on every push attempt.
    sequence: u64,
    stats: EndpointStats,
    status: SharedStatus,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, slot: Arc<FrameSlot>) -> Self {
        Self {
            name: name.into(),
            slot,
            state: EndpointState::Idle,
            sink: None,
            sequence: 0,
            stats: EndpointStats::default(),
            status: Arc::new(Mutex::new(EndpointStatus::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `/<name>`.
    pub fn path(&self) -> String {
        format!("/{}", self.name)
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Handle to the mirrored status, readable from any thread.
    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    fn sync_status(&self) {
        *self.status.lock() = EndpointStatus {
            state: self.state,
            stats: self.stats,
        };
    }

    // ── Signals ──────────────────────────────────────────────────

    /// Connect a consumer. A previous consumer is replaced and the
    /// endpoint waits for the new one's first need-data.
    pub fn attach(&mut self, sink: Box<dyn FrameSink>) -> Result<(), XStreamError> {
        self.state.reset()?;
        self.sink = Some(sink);
        self.sync_status();
        Ok(())
    }

    /// Disconnect the consumer and go back to `Idle`.
    pub fn detach(&mut self) -> Result<(), XStreamError> {
        self.state.reset()?;
        self.sink = None;
        self.sync_status();
        Ok(())
    }

    /// Answer a need-data signal by handing off the current image.
    ///
    /// Returns `Ok(false)` when no consumer is attached; the endpoint then
    /// stays `Idle`. A rejected push is counted and reported as
    /// [`XStreamError::FrameDeliveryError`] but leaves the endpoint
    /// `Producing`, ready for the next signal.
    pub fn on_need_data(&mut self) -> Result<bool, XStreamError> {
        if self.state.is_stopped() {
            return Err(XStreamError::InvalidTransition(
                "need-data ignored: endpoint is stopped",
            ));
        }
        self.stats.need_data += 1;

        let Some(sink) = self.sink.as_mut() else {
            self.sync_status();
            return Ok(false);
        };
        self.state.produce()?;

        // Snapshots are immutable, so the frame is a consistent copy of
        // the slot at this instant.
        let snapshot = self.slot.acquire();
        let frame = Frame {
            endpoint: self.name.clone(),
            width: self.slot.width(),
            height: self.slot.height(),
            generation: snapshot.generation,
            sequence: self.sequence,
            data: snapshot.data,
        };

        self.sequence += 1;

        let result = match sink.push(frame) {
            Ok(()) => {
                self.stats.frames_delivered += 1;
                Ok(true)
            }
            Err(source) => {
                self.stats.delivery_errors += 1;
                Err(XStreamError::FrameDeliveryError {
                    endpoint: self.name.clone(),
                    source,
                })
            }
        };
        self.sync_status();
        result
    }

    /// Answer an enough-data signal by pausing.
    pub fn on_enough_data(&mut self) -> Result<(), XStreamError> {
        self.state.pause()?;
        self.sync_status();
        Ok(())
    }

    /// Final transition; drops the consumer.
    pub fn stop(&mut self) {
        self.state.stop();
        self.sink = None;
        self.sync_status();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use bytes::Bytes;

    fn collecting_sink() -> (Box<dyn FrameSink>, Arc<Mutex<Vec<Frame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&frames);
        let sink: Box<dyn FrameSink> = Box::new(move |f: Frame| {
            out.lock().push(f);
            Ok::<(), FlowError>(())
        });
        (sink, frames)
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("pfd", Arc::new(FrameSlot::new(1, 1)))
    }

    #[test]
    fn state_transitions() {
        let mut s = EndpointState::Idle;
        assert!(s.pause().is_err());
        s.produce().unwrap();
        s.pause().unwrap();
        assert_eq!(s, EndpointState::Paused);
        s.produce().unwrap();
        s.reset().unwrap();
        assert_eq!(s, EndpointState::Idle);

        s.stop();
        assert!(s.produce().is_err());
        assert!(s.pause().is_err());
        assert!(s.reset().is_err());
        assert_eq!(s, EndpointState::Stopped);
    }

    #[test]
    fn need_data_without_sink_stays_idle() {
        let mut ep = endpoint();
        assert!(!ep.on_need_data().unwrap());
        assert_eq!(ep.state(), EndpointState::Idle);
        assert_eq!(ep.stats().need_data, 1);
    }

    #[test]
    fn need_data_hands_off_current_image() {
        let mut ep = endpoint();
        let (sink, frames) = collecting_sink();
        ep.attach(sink).unwrap();

        ep.slot().publish(Bytes::from_static(&[1, 2, 3, 4]));
        assert!(ep.on_need_data().unwrap());
        ep.slot().publish(Bytes::from_static(&[5, 6, 7, 8]));
        assert!(ep.on_need_data().unwrap());

        let frames = frames.lock();
        assert_eq!(ep.state(), EndpointState::Producing);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].data[..], &[1, 2, 3, 4]);
        assert_eq!((frames[0].sequence, frames[0].generation), (0, 1));
        assert_eq!(&frames[1].data[..], &[5, 6, 7, 8]);
        assert_eq!((frames[1].sequence, frames[1].generation), (1, 2));
    }

    #[test]
    fn pause_then_resume() {
        let mut ep = endpoint();
        let (sink, frames) = collecting_sink();
        ep.attach(sink).unwrap();
        ep.on_need_data().unwrap();
        ep.on_enough_data().unwrap();
        assert_eq!(ep.state(), EndpointState::Paused);
        assert_eq!(frames.lock().len(), 1);

        ep.on_need_data().unwrap();
        assert_eq!(ep.state(), EndpointState::Producing);
        assert_eq!(frames.lock().len(), 2);
    }

    #[test]
    fn flow_error_keeps_endpoint_eligible() {
        let mut ep = endpoint();
        let mut fail = true;
        ep.attach(Box::new(move |_f: Frame| {
            if std::mem::replace(&mut fail, false) {
                Err(FlowError::Flushing)
            } else {
                Ok(())
            }
        }))
        .unwrap();

        let err = ep.on_need_data().unwrap_err();
        assert!(matches!(
            err,
            XStreamError::FrameDeliveryError { source: FlowError::Flushing, .. }
        ));
        assert_eq!(ep.state(), EndpointState::Producing);

        assert!(ep.on_need_data().unwrap());
        assert_eq!(
            ep.stats(),
            EndpointStats { need_data: 2, frames_delivered: 1, delivery_errors: 1 }
        );
    }

    #[test]
    fn failed_push_still_consumes_a_sequence_number() {
        let mut ep = endpoint();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        let mut pushes = 0;
        let sink: Box<dyn FrameSink> = Box::new(move |f: Frame| {
            pushes += 1;
            out.lock().push(f.sequence);
            if pushes == 2 {
                Err(FlowError::Flushing)
            } else {
                Ok(())
            }
        });
        ep.attach(sink).unwrap();

        assert!(ep.on_need_data().unwrap());
        assert!(ep.on_need_data().is_err());
        assert!(ep.on_need_data().unwrap());

        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(ep.stats().frames_delivered, 2);
        assert_eq!(ep.stats().delivery_errors, 1);
    }

    #[test]
    fn stop_is_terminal_and_mirrored() {
        let mut ep = endpoint();
        let status = ep.status();
        let (sink, _frames) = collecting_sink();
        ep.attach(sink).unwrap();
        ep.stop();

        assert!(ep.on_need_data().is_err());
        assert!(ep.on_enough_data().is_err());
        assert!(ep.attach(collecting_sink().0).is_err());
        assert!(!ep.has_sink());
        assert_eq!(status.lock().state, EndpointState::Stopped);
    }

    #[test]
    fn detach_returns_to_idle() {
        let mut ep = endpoint();
        let (sink, frames) = collecting_sink();
        ep.attach(sink).unwrap();
        ep.on_need_data().unwrap();
        ep.detach().unwrap();

        assert_eq!(ep.state(), EndpointState::Idle);
        assert!(!ep.on_need_data().unwrap());
        assert_eq!(frames.lock().len(), 1);
    }
}
