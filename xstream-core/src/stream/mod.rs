//! Delivery side: endpoints, the background server, transport seams.
//!
//! | Module      | Purpose                                               |
//! |-------------|-------------------------------------------------------|
//! | `endpoint`  | Per-region demand state machine and frame handoff     |
//! | `server`    | Delivery thread, event loop, `DeliveryControl`        |
//! | `transport` | `Transport` / `FrameSink` traits, `Frame`, mounts     |
//! | `pipeline`  | Typed, validated encode pipeline configuration        |

pub mod endpoint;
pub mod pipeline;
pub mod server;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────

pub use endpoint::{Endpoint, EndpointState, EndpointStats, EndpointStatus};
pub use pipeline::{
    Codec, H264Encoder, H264Options, MjpegOptions, PipelineBuilder, PipelineConfig, RawFormat,
    VideoCaps,
};
pub use server::{DeliveryControl, DeliveryServer};
pub use transport::{Frame, FrameSink, MountSpec, NullTransport, Transport};
