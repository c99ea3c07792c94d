//! Periodic capture and slicing.
//!
//! The host calls [`RegionSlicer::tick`] once per rendered frame. The
//! slicer throttles itself to one real capture per interval: read the
//! whole source buffer back, then cut every region out of it with a
//! vertical flip and publish the result.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::capture::host::TextureHost;
use crate::capture::types::{Region, SourceBuffer};
use crate::catalog::{BYTES_PER_PIXEL, RegionLayout};

/// Default minimum spacing between captures, in host seconds.
pub const DEFAULT_CAPTURE_INTERVAL: f64 = 0.5;

// ── slice_flipped ────────────────────────────────────────────────

/// Copy `layout`'s rectangle out of a top-to-bottom `src` image into
/// `dst`, bottom row first.
///
/// Destination row `r` receives source row `y + height - 1 - r`; each
/// row is one contiguous copy of `width * 4` bytes. The rectangle must
/// lie inside the source and `dst` must be exactly `width * height * 4`
/// bytes; both are guaranteed by catalog validation.
pub fn slice_flipped(src: &[u8], src_width: u32, layout: &RegionLayout, dst: &mut [u8]) {
    let src_stride = src_width as usize * BYTES_PER_PIXEL;
    let dst_stride = layout.width as usize * BYTES_PER_PIXEL;
    let start = layout.x as usize * BYTES_PER_PIXEL + layout.y as usize * src_stride;

    debug_assert_eq!(dst.len(), layout.byte_len());

    let dst_rows = dst.chunks_exact_mut(dst_stride).rev();
    let src_rows = src[start..].chunks(src_stride);
    for (dst_row, src_row) in dst_rows.zip(src_rows) {
        dst_row.copy_from_slice(&src_row[..dst_stride]);
    }
}

// ── TickOutcome ──────────────────────────────────────────────────

/// What a single [`RegionSlicer::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The slicer is stopped; nothing happened.
    Stopped,
    /// Less than one interval since the last capture; nothing happened.
    Throttled,
    /// Sources were read back and `regions` slots were published.
    Captured { regions: usize },
}

// ── RegionSlicer ─────────────────────────────────────────────────

/// Owns the discovered sources and refreshes their regions on a schedule.
pub struct RegionSlicer {
    sources: Vec<SourceBuffer>,
    interval: f64,
    last_run: Option<f64>,
    running: AtomicBool,
    read_backs: u64,
}

impl RegionSlicer {
    /// Create a stopped slicer over `sources`.
    pub fn new(sources: Vec<SourceBuffer>, interval: f64) -> Self {
        Self {
            sources,
            interval,
            last_run: None,
            running: AtomicBool::new(false),
            read_backs: 0,
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of source read-backs performed by ticks.
    pub fn read_backs(&self) -> u64 {
        self.read_backs
    }

    pub fn sources(&self) -> &[SourceBuffer] {
        &self.sources
    }

    /// Every region across every source.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.sources.iter().flat_map(|s| s.regions.iter())
    }

    /// One host frame tick at host time `now` (seconds).
    pub fn tick(&mut self, host: &dyn TextureHost, now: f64) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Stopped;
        }

        if let Some(last) = self.last_run {
            let elapsed = now - last;
            // A clock that went backwards (host reload) resets the schedule.
            if elapsed >= 0.0 && elapsed < self.interval {
                return TickOutcome::Throttled;
            }
        }
        self.last_run = Some(now);

        let mut published = 0;
        for source in &mut self.sources {
            if let Err(e) = host.read_pixels(source.id, &mut source.pixels) {
                tracing::warn!(texture = %source.id, "read-back failed, skipping this tick: {e}");
                continue;
            }
            self.read_backs += 1;

            for region in &source.regions {
                region.refresh(&source.pixels, source.width);
                published += 1;
            }
        }

        tracing::trace!(now, regions = published, "capture tick");
        TickOutcome::Captured { regions: published }
    }
}

// ── Tests ────────────────────────────────────────────────────────
