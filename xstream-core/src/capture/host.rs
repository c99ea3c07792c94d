//! The host's buffer surface.
//!
//! Host glue implements [`TextureHost`] on top of whatever the host
//! exposes (GL texture names, shared memory, ...). [`MemoryHost`] keeps
//! buffers in process memory; it backs the tests and the replay service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::capture::types::TextureId;
use crate::catalog::BYTES_PER_PIXEL;
use crate::error::XStreamError;

/// Read access to host buffers. Only ever called from the capture context.
pub trait TextureHost {
    /// Whether `id` names a live buffer.
    fn exists(&self, id: TextureId) -> bool;

    /// `(width, height)` of `id`, or `None` if it does not exist.
    fn dimensions(&self, id: TextureId) -> Option<(u32, u32)>;

    /// Copy the full RGBA contents of `id` into `out`.
    ///
    /// `out` must be exactly `width * height * 4` bytes.
    fn read_pixels(&self, id: TextureId, out: &mut [u8]) -> Result<(), XStreamError>;
}

// ── MemoryHost ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MemoryTexture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// In-process host holding RGBA buffers keyed by [`TextureId`].
#[derive(Debug, Default)]
pub struct MemoryHost {
    textures: RwLock<BTreeMap<TextureId, MemoryTexture>>,
    reads: AtomicU64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a buffer.
    pub fn insert(&self, id: TextureId, width: u32, height: u32, pixels: Vec<u8>) -> Result<(), XStreamError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(XStreamError::Host(format!(
                "texture {id}: {} bytes for {width}x{height} (expected {expected})",
                pixels.len()
            )));
        }
        self.textures.write().insert(
            id,
            MemoryTexture {
                width,
                height,
                pixels,
            },
        );
        Ok(())
    }

    /// Mutate a buffer's pixels in place.
    pub fn update<F>(&self, id: TextureId, f: F) -> Result<(), XStreamError>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut textures = self.textures.write();
        let tex = textures
            .get_mut(&id)
            .ok_or_else(|| XStreamError::Host(format!("texture {id} does not exist")))?;
        f(&mut tex.pixels);
        Ok(())
    }

    pub fn remove(&self, id: TextureId) -> bool {
        self.textures.write().remove(&id).is_some()
    }

    /// Ids of every buffer, ascending.
    pub fn ids(&self) -> Vec<TextureId> {
        self.textures.read().keys().copied().collect()
    }

    /// Number of successful `read_pixels` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl TextureHost for MemoryHost {
    fn exists(&self, id: TextureId) -> bool {
        self.textures.read().contains_key(&id)
    }

    fn dimensions(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.read().get(&id).map(|t| (t.width, t.height))
    }

    fn read_pixels(&self, id: TextureId, out: &mut [u8]) -> Result<(), XStreamError> {
        let textures = self.textures.read();
        let tex = textures
            .get(&id)
            .ok_or_else(|| XStreamError::Host(format!("texture {id} does not exist")))?;
        if out.len() != tex.pixels.len() {
            return Err(XStreamError::Host(format!(
                "texture {id}: read buffer is {} bytes, texture is {}",
                out.len(),
                tex.pixels.len()
            )));
        }
        out.copy_from_slice(&tex.pixels);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
