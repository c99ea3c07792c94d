//! # xstream-core
//!
//! Turns one large host-rendered image buffer into several independently
//! consumable per-display video feeds.
//!
//! This crate contains:
//! - **Catalog**: `Catalog`, `VehicleDefinition`, glob-based `IdentityMatcher`
//! - **Capture**: `TextureHost` seam, fingerprint `BufferDiscoverer`,
//!   throttled `RegionSlicer`, publish/acquire `FrameSlot`, `TickDispatcher`,
//!   raw buffer dumps
//! - **Stream**: `DeliveryServer` on a background thread, per-region
//!   `Endpoint` state machines, `DeliveryControl`, `Transport` / `FrameSink`
//!   seams, typed `PipelineConfig`
//! - **Controller**: `StreamController`, the context object tying it together
//! - **Error**: `XStreamError`: typed, `thiserror`-based error hierarchy

pub mod capture;
pub mod catalog;
pub mod controller;
pub mod error;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    BufferDiscoverer, FrameSlot, MemoryHost, Region, RegionSlicer, ScanRange, Snapshot,
    SourceBuffer, TextureHost, TextureId, TickDispatcher,
};
pub use catalog::{Catalog, GlobPattern, IdentityMatcher, IdentitySource, StaticIdentity, VehicleDefinition};
pub use controller::{ControllerSettings, StreamController};
pub use error::{FlowError, XStreamError};
pub use stream::{
    DeliveryControl, DeliveryServer, EndpointState, Frame, FrameSink, MountSpec, NullTransport,
    PipelineBuilder, PipelineConfig, Transport,
};
