//! Shared types for the capture pipeline.
//!
//! A [`SourceBuffer`] is the host-owned image that holds several displays.
//! Each [`Region`] slices one display out of it and publishes the result
//! into a [`FrameSlot`], which is the only state shared with the delivery
//! thread.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::capture::slicer::slice_flipped;
use crate::catalog::{BYTES_PER_PIXEL, RegionLayout};

// ── TextureId ────────────────────────────────────────────────────

/// Opaque handle of a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── FrameSlot ────────────────────────────────────────────────────

/// An immutable, published region image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Publish count at the time of this image; 0 is the blank initial image.
    pub generation: u64,
    /// `width * height * 4` bytes of RGBA, bottom row first.
    pub data: Bytes,
}

/// Publish/acquire cell for one region.
///
/// The capture context publishes a complete slice; the delivery context
/// acquires whatever was published last. Published data is immutable, so
/// an acquired snapshot can never be observed half-written.
pub struct FrameSlot {
    width: u32,
    height: u32,
    latest: Mutex<Snapshot>,
}

impl FrameSlot {
    /// Create a slot holding a blank (all-zero) image.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            latest: Mutex::new(Snapshot {
                generation: 0,
                data: Bytes::from(vec![0u8; len]),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size of one frame in bytes.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Replace the current image. Returns the new generation.
    pub fn publish(&self, data: Bytes) -> u64 {
        debug_assert_eq!(data.len(), self.byte_len());
        let mut latest = self.latest.lock();
        latest.generation += 1;
        latest.data = data;
        latest.generation
    }

    /// The most recently published image.
    pub fn acquire(&self) -> Snapshot {
        self.latest.lock().clone()
    }

    /// Generation of the most recent publish.
    pub fn generation(&self) -> u64 {
        self.latest.lock().generation
    }
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("generation", &self.generation())
            .finish()
    }
}

// ── Region ───────────────────────────────────────────────────────

/// One display cut out of a source buffer.
#[derive(Debug)]
pub struct Region {
    layout: RegionLayout,
    slot: Arc<FrameSlot>,
}

impl Region {
    pub fn new(layout: RegionLayout) -> Self {
        let slot = Arc::new(FrameSlot::new(layout.width, layout.height));
        Self { layout, slot }
    }

    pub fn name(&self) -> &str {
        &self.layout.name
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// Shared handle to the published image.
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Cut this region out of `src` (flipped) and publish it.
    ///
    /// Returns the new slot generation.
    pub fn refresh(&self, src: &[u8], src_width: u32) -> u64 {
        let mut frame = BytesMut::zeroed(self.layout.byte_len());
        slice_flipped(src, src_width, &self.layout, &mut frame);
        self.slot.publish(frame.freeze())
    }
}

// ── SourceBuffer ─────────────────────────────────────────────────

/// A discovered host buffer and the regions cut from it.
///
/// `pixels` holds `height` rows of `width * 4` bytes, top row first.
#[derive(Debug)]
pub struct SourceBuffer {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub regions: Vec<Region>,
}

impl SourceBuffer {
    /// Wrap already-read `pixels` and allocate one region per layout.
    pub fn new(id: TextureId, width: u32, height: u32, pixels: Vec<u8>, layouts: &[RegionLayout]) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * BYTES_PER_PIXEL);
        Self {
            id,
            width,
            height,
            pixels,
            regions: layouts.iter().cloned().map(Region::new).collect(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_starts_blank_at_generation_zero() {
        let slot = FrameSlot::new(4, 2);
        let snap = slot.acquire();
        assert_eq!(snap.generation, 0);
        assert_eq!(snap.data.len(), 4 * 2 * 4);
        assert!(snap.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn acquired_snapshot_survives_later_publish() {
        let slot = FrameSlot::new(1, 1);
        slot.publish(Bytes::from_static(&[1, 2, 3, 4]));
        let held = slot.acquire();

        let generation = slot.publish(Bytes::from_static(&[9, 9, 9, 9]));
        assert_eq!(generation, 2);
        assert_eq!(&held.data[..], &[1, 2, 3, 4]);
        assert_eq!(&slot.acquire().data[..], &[9, 9, 9, 9]);
    }

    #[test]
    fn slot_is_shared_across_threads() {
        let slot = Arc::new(FrameSlot::new(2, 2));
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for v in 1..=50u8 {
                    slot.publish(Bytes::from(vec![v; 16]));
                }
            })
        };
        for _ in 0..50 {
            let snap = slot.acquire();
            // Every byte of a snapshot comes from the same publish.
            assert!(snap.data.iter().all(|&b| b == snap.data[0]));
        }
        writer.join().unwrap();
        assert_eq!(slot.generation(), 50);
    }

    #[test]
    fn source_buffer_allocates_one_region_per_layout() {
        let pixels: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8).collect();
        let layouts = [
            RegionLayout {
                name: "pfd".into(),
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            RegionLayout {
                name: "nd".into(),
                x: 1,
                y: 0,
                width: 1,
                height: 2,
            },
        ];
        let src = SourceBuffer::new(TextureId(7), 2, 2, pixels, &layouts);
        let names: Vec<_> = src.regions.iter().map(Region::name).collect();
        assert_eq!(names, vec!["pfd", "nd"]);
        assert_eq!(src.regions[0].slot().byte_len(), 4);
        assert_eq!(src.regions[1].slot().byte_len(), 8);

        // Source row 1 ends up first in the flipped slice.
        src.regions[1].refresh(&src.pixels, src.width);
        assert_eq!(&src.regions[1].slot().acquire().data[..], &[12, 13, 14, 15, 4, 5, 6, 7]);
    }
}
