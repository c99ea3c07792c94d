//! Capture side: host buffers, discovery, slicing, debug export.
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `types`     | `TextureId`, `FrameSlot`, `Region`, `SourceBuffer`   |
//! | `host`      | `TextureHost` trait, in-memory host                  |
//! | `discovery` | Fingerprint scan over a candidate id range           |
//! | `slicer`    | Throttled read-back and flipped region slicing       |
//! | `dispatch`  | Frame-tick handler registry                          |
//! | `dump`      | Raw dumps of host buffers and their reload           |

pub mod discovery;
pub mod dispatch;
pub mod dump;
pub mod host;
pub mod slicer;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use discovery::{BufferDiscoverer, Discovered, ScanRange};
pub use dispatch::{TickDispatcher, TickId};
pub use dump::{
    CANDIDATE_TAG, DEFAULT_MIN_DUMP_SIZE, DumpFile, dump_candidates, dump_sources, list_dumps,
    read_dump, write_dump,
};
pub use host::{MemoryHost, TextureHost};
pub use slicer::{DEFAULT_CAPTURE_INTERVAL, RegionSlicer, TickOutcome, slice_flipped};
pub use types::{FrameSlot, Region, Snapshot, SourceBuffer, TextureId};
