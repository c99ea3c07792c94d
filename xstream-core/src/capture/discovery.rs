//! Content-based discovery of the source buffer.
//!
//! Host buffer ids carry no meaning, so the right buffer is found by
//! fingerprint: dimensions first (cheap), then a full read-back and a
//! byte-prefix comparison.
//!
//! # Tie-break
//!
//! Candidates are visited in **ascending id order** and, within one
//! candidate, signatures are tried in catalog order. The first hit wins.
//! This order is a fixed policy of the discoverer; it does not rely on
//! the host enumerating buffers in any particular order.

use crate::capture::host::TextureHost;
use crate::capture::types::{SourceBuffer, TextureId};
use crate::catalog::VehicleDefinition;
use crate::error::XStreamError;

// ── ScanRange ────────────────────────────────────────────────────

/// Inclusive range of candidate ids, always scanned low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    first: u32,
    last: u32,
}

impl ScanRange {
    /// Create a range; `first` must not exceed `last`.
    pub fn new(first: u32, last: u32) -> Result<Self, XStreamError> {
        if first > last {
            return Err(XStreamError::Other(format!(
                "scan range {first}..={last} is empty"
            )));
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    /// Candidate ids in scan order.
    pub fn iter(&self) -> impl Iterator<Item = TextureId> {
        (self.first..=self.last).map(TextureId)
    }

    pub fn len(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self { first: 1, last: 999 }
    }
}

// ── Discovered ───────────────────────────────────────────────────

/// Result of a successful scan.
#[derive(Debug)]
pub struct Discovered {
    /// The matched buffer, already holding its first read-back, with one
    /// region per layout entry of the matched signature.
    pub source: SourceBuffer,
    /// Index of the matched signature within the definition.
    pub signature_index: usize,
}

// ── BufferDiscoverer ─────────────────────────────────────────────

/// Scans host buffers for one matching a definition's signatures.
pub struct BufferDiscoverer<'a> {
    definition: &'a VehicleDefinition,
    range: ScanRange,
}

impl<'a> BufferDiscoverer<'a> {
    pub fn new(definition: &'a VehicleDefinition, range: ScanRange) -> Self {
        Self { definition, range }
    }

    /// Run the scan.
    ///
    /// Returns [`XStreamError::BufferNotFound`] when no candidate in range
    /// matches. A candidate whose read-back fails is logged and skipped.
    pub fn discover(&self, host: &dyn TextureHost) -> Result<Discovered, XStreamError> {
        let mut scanned = 0usize;

        for id in self.range.iter() {
            if !host.exists(id) {
                continue;
            }
            scanned += 1;

            let Some((width, height)) = host.dimensions(id) else {
                continue;
            };
            tracing::trace!(texture = %id, width, height, "candidate");

            // Read back lazily, and at most once per candidate.
            let mut pixels: Option<Vec<u8>> = None;

            for (index, layout) in self.definition.signatures.iter().enumerate() {
                let sig = &layout.signature;
                if !sig.matches_dimensions(width, height) {
                    continue;
                }

                if pixels.is_none() {
                    let mut buf = vec![0u8; sig.byte_len()];
                    match host.read_pixels(id, &mut buf) {
                        Ok(()) => pixels = Some(buf),
                        Err(e) => {
                            tracing::warn!(texture = %id, "read-back failed during discovery: {e}");
                            break;
                        }
                    }
                }

                let Some(buf) = pixels.as_deref() else {
                    break;
                };
                tracing::debug!(
                    texture = %id,
                    prefix = ?&buf[..buf.len().min(sig.pattern.len())],
                    "dimensions match, checking pattern"
                );

                if sig.matches_prefix(buf) {
                    tracing::info!(
                        texture = %id,
                        width,
                        height,
                        definition = %self.definition.label,
                        regions = layout.regions.len(),
                        "source buffer found"
                    );
                    let pixels = pixels.take().unwrap_or_default();
                    return Ok(Discovered {
                        source: SourceBuffer::new(id, width, height, pixels, &layout.regions),
                        signature_index: index,
                    });
                }
            }
        }

        tracing::info!(
            definition = %self.definition.label,
            scanned,
            "no source buffer matched"
        );
        Err(XStreamError::BufferNotFound { scanned })
    }
}

// ── Tests ────────────────────────────────────────────────────────
