//! Debug export of host buffers to raw files.
//!
//! Files hold bare RGBA bytes, top row first, named
//! `texture_<tag>_<id>_<width>x<height>.dat` (or `.dat.zst` when
//! compressed). The dimensions in the name are what lets the replay host
//! load a dump back without any side metadata.

use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::discovery::ScanRange;
use crate::capture::host::TextureHost;
use crate::capture::types::{SourceBuffer, TextureId};
use crate::catalog::BYTES_PER_PIXEL;
use crate::error::XStreamError;

/// Tag used by [`dump_candidates`].
pub const CANDIDATE_TAG: &str = "dump";

/// Smallest buffer [`dump_candidates`] writes by default.
pub const DEFAULT_MIN_DUMP_SIZE: (u32, u32) = (2048, 2048);

const ZSTD_LEVEL: i32 = 3;

// ── DumpFile ─────────────────────────────────────────────────────

/// Name components of one dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    pub tag: String,
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub compressed: bool,
}

impl DumpFile {
    /// Build a name for `id`; `tag` is sanitised into a single path segment.
    pub fn new(tag: &str, id: TextureId, width: u32, height: u32, compressed: bool) -> Self {
        Self {
            tag: sanitize_tag(tag),
            id,
            width,
            height,
            compressed,
        }
    }

    pub fn file_name(&self) -> String {
        let ext = if self.compressed { "dat.zst" } else { "dat" };
        format!(
            "texture_{}_{}_{}x{}.{ext}",
            self.tag, self.id, self.width, self.height
        )
    }

    /// Parse a file name produced by [`DumpFile::file_name`].
    ///
    /// Tags may themselves contain `_`; id and dimensions are taken from
    /// the right.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("texture_")?;
        let (rest, compressed) = match rest.strip_suffix(".dat.zst") {
            Some(r) => (r, true),
            None => (rest.strip_suffix(".dat")?, false),
        };
        let (rest, dims) = rest.rsplit_once('_')?;
        let (tag, id) = rest.rsplit_once('_')?;
        let (w, h) = dims.split_once('x')?;

        if tag.is_empty() {
            return None;
        }
        Some(Self {
            tag: tag.to_string(),
            id: TextureId(id.parse().ok()?),
            width: w.parse().ok()?,
            height: h.parse().ok()?,
            compressed,
        })
    }

    /// Expected size of the uncompressed payload.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() { "unknown".to_string() } else { cleaned }
}

// ── Writing ──────────────────────────────────────────────────────

/// Write one buffer to `dir`. Returns the path written.
pub fn write_dump(dir: &Path, file: &DumpFile, pixels: &[u8]) -> Result<PathBuf, XStreamError> {
    if pixels.len() != file.byte_len() {
        return Err(XStreamError::Other(format!(
            "dump of texture {}: {} bytes for {}x{}",
            file.id,
            pixels.len(),
            file.width,
            file.height
        )));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(file.file_name());
    if file.compressed {
        fs::write(&path, zstd::encode_all(pixels, ZSTD_LEVEL)?)?;
    } else {
        fs::write(&path, pixels)?;
    }
    tracing::debug!(path = %path.display(), bytes = pixels.len(), "dump written");
    Ok(path)
}

/// Dump every identified source buffer, freshly read back, under `tag`.
///
/// A source whose read-back fails is dumped from the pixels it already
/// holds.
pub fn dump_sources(
    host: &dyn TextureHost,
    sources: &[SourceBuffer],
    dir: &Path,
    tag: &str,
    compress: bool,
) -> Result<Vec<PathBuf>, XStreamError> {
    let mut written = Vec::with_capacity(sources.len());
    for source in sources {
        let mut pixels = vec![0u8; source.pixels.len()];
        if let Err(e) = host.read_pixels(source.id, &mut pixels) {
            tracing::warn!(texture = %source.id, "read-back failed, dumping last capture: {e}");
            pixels.copy_from_slice(&source.pixels);
        }
        let file = DumpFile::new(tag, source.id, source.width, source.height, compress);
        written.push(write_dump(dir, &file, &pixels)?);
    }
    tracing::info!(dir = %dir.display(), count = written.len(), "sources dumped");
    Ok(written)
}

/// Dump every buffer in `range` at least `min` in both dimensions.
pub fn dump_candidates(
    host: &dyn TextureHost,
    range: ScanRange,
    min: (u32, u32),
    dir: &Path,
    compress: bool,
) -> Result<Vec<PathBuf>, XStreamError> {
    let mut written = Vec::new();
    for id in range.iter() {
        let Some((width, height)) = host.dimensions(id) else {
            continue;
        };
        tracing::debug!(texture = %id, width, height, "dump candidate");
        if width < min.0 || height < min.1 {
            continue;
        }

        let file = DumpFile::new(CANDIDATE_TAG, id, width, height, compress);
        let mut pixels = vec![0u8; file.byte_len()];
        if let Err(e) = host.read_pixels(id, &mut pixels) {
            tracing::warn!(texture = %id, "read-back failed, not dumped: {e}");
            continue;
        }
        written.push(write_dump(dir, &file, &pixels)?);
    }
    tracing::info!(dir = %dir.display(), count = written.len(), "candidates dumped");
    Ok(written)
}

// ── Reading ──────────────────────────────────────────────────────

/// Load one dump file, decompressing if needed.
pub fn read_dump(path: &Path) -> Result<(DumpFile, Vec<u8>), XStreamError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| XStreamError::Other(format!("{}: not a dump file", path.display())))?;
    let file = DumpFile::parse(name)
        .ok_or_else(|| XStreamError::Other(format!("{name}: not a dump file name")))?;

    let raw = fs::read(path)?;
    let pixels = if file.compressed {
        zstd::decode_all(raw.as_slice())?
    } else {
        raw
    };
    if pixels.len() != file.byte_len() {
        return Err(XStreamError::Other(format!(
            "{name}: {} bytes, expected {}",
            pixels.len(),
            file.byte_len()
        )));
    }
    Ok((file, pixels))
}

/// Dump files in `dir`, sorted by texture id.
pub fn list_dumps(dir: &Path) -> Result<Vec<(PathBuf, DumpFile)>, XStreamError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(DumpFile::parse);
        if let Some(file) = parsed {
            found.push((path, file));
        }
    }
    found.sort_by_key(|(_, f)| f.id);
    Ok(found)
}

// ── Tests ────────────────────────────────────────────────────────
