//! Signature catalog and identity matching.
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `glob`       | Shell-style pattern compiler / matcher              |
//! | `definition` | Catalog records, validation, signatures and layouts |
//! | `identity`   | Runtime identity → vehicle definition               |

pub mod definition;
pub mod glob;
pub mod identity;

// ── Re-exports ───────────────────────────────────────────────────

pub use definition::{
    BYTES_PER_PIXEL, Catalog, RegionLayout, Signature, SignatureLayout, SignatureRecord,
    VehicleDefinition, VehicleRecord,
};
pub use glob::GlobPattern;
pub use identity::{IdentityMatcher, IdentitySource, StaticIdentity};
