//! Vehicle definitions, signatures and region layouts.
//!
//! The catalog is an ordered list of [`VehicleDefinition`]s, loaded once
//! and read-only thereafter. Every region rectangle is checked against
//! its signature's dimensions here, so the capture path never has to
//! re-check bounds per frame.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::glob::GlobPattern;
use crate::error::XStreamError;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

// ── Records (wire format) ────────────────────────────────────────

/// A named rectangle inside a source buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLayout {
    /// Endpoint name; mounted as `/<name>`.
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionLayout {
    /// Size of the region's RGBA buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Whether the rectangle lies inside a `width × height` buffer.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// A signature entry as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub width: u32,
    pub height: u32,
    #[serde(alias = "bytePattern")]
    pub pattern: Vec<u8>,
    #[serde(default, alias = "region")]
    pub regions: Vec<RegionLayout>,
}

/// A vehicle definition as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Optional human-readable label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(alias = "authorPattern")]
    pub author: String,
    #[serde(alias = "typeCodePatterns")]
    pub type_codes: Vec<String>,
    #[serde(default, alias = "signature")]
    pub signatures: Vec<SignatureRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "vehicle", alias = "vehicles")]
    vehicles: Vec<VehicleRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonCatalog {
    Bare(Vec<VehicleRecord>),
    Wrapped(CatalogFile),
}

// ── Compiled types ───────────────────────────────────────────────

/// Content fingerprint of a source buffer: dimensions + pixel prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub width: u32,
    pub height: u32,
    pub pattern: Vec<u8>,
}

impl Signature {
    /// Whether a candidate of `width × height` is worth reading back.
    pub fn matches_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Whether the first `pattern.len()` bytes of `pixels` equal the pattern.
    pub fn matches_prefix(&self, pixels: &[u8]) -> bool {
        pixels.starts_with(&self.pattern)
    }

    /// Size of a matching buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// A signature together with the regions to cut out of matching buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLayout {
    pub signature: Signature,
    pub regions: Vec<RegionLayout>,
}

/// Binds a runtime identity to one or more signature layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleDefinition {
    pub label: String,
    pub author: GlobPattern,
    pub type_codes: Vec<GlobPattern>,
    pub signatures: Vec<SignatureLayout>,
}

impl VehicleDefinition {
    /// Author glob matches `author` and at least one type-code glob
    /// matches `type_code`.
    pub fn matches(&self, author: &str, type_code: &str) -> bool {
        self.author.matches(author) && self.type_codes.iter().any(|p| p.matches(type_code))
    }

    fn compile(index: usize, record: VehicleRecord) -> Result<Self, XStreamError> {
        let label = record
            .label
            .clone()
            .unwrap_or_else(|| format!("#{index} ({})", record.author));
        let bad = |msg: String| XStreamError::InvalidCatalog(format!("vehicle {label}: {msg}"));

        if record.type_codes.is_empty() {
            return Err(bad("no type-code patterns".into()));
        }
        if record.signatures.is_empty() {
            return Err(bad("no signatures".into()));
        }

        let author = GlobPattern::new(&record.author)?;
        let type_codes = record
            .type_codes
            .iter()
            .map(|p| GlobPattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = HashSet::new();
        let mut signatures = Vec::with_capacity(record.signatures.len());
        for sig in record.signatures {
            if sig.width == 0 || sig.height == 0 {
                return Err(bad(format!("signature {}x{} is empty", sig.width, sig.height)));
            }
            let signature = Signature {
                width: sig.width,
                height: sig.height,
                pattern: sig.pattern,
            };
            if signature.pattern.is_empty() {
                return Err(bad(format!(
                    "signature {}x{} has an empty byte pattern",
                    sig.width, sig.height
                )));
            }
            if signature.pattern.len() > signature.byte_len() {
                return Err(bad(format!(
                    "signature {}x{} pattern is longer than the buffer",
                    sig.width, sig.height
                )));
            }

            for region in &sig.regions {
                if !is_valid_region_name(&region.name) {
                    return Err(bad(format!("region name {:?} is not a path segment", region.name)));
                }
                if !names.insert(region.name.clone()) {
                    return Err(bad(format!("duplicate region name {:?}", region.name)));
                }
                if region.width == 0 || region.height == 0 {
                    return Err(bad(format!("region {} is empty", region.name)));
                }
                if !region.fits_within(sig.width, sig.height) {
                    return Err(bad(format!(
                        "region {} ({},{} {}x{}) exceeds {}x{}",
                        region.name,
                        region.x,
                        region.y,
                        region.width,
                        region.height,
                        sig.width,
                        sig.height
                    )));
                }
            }

            signatures.push(SignatureLayout {
                signature,
                regions: sig.regions,
            });
        }

        Ok(Self {
            label,
            author,
            type_codes,
            signatures,
        })
    }
}

fn is_valid_region_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.chars().any(char::is_whitespace)
}

// ── Catalog ──────────────────────────────────────────────────────

/// Ordered, validated set of vehicle definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    definitions: Vec<VehicleDefinition>,
}

impl Catalog {
    /// Validate and compile records, preserving their order.
    pub fn from_records(records: Vec<VehicleRecord>) -> Result<Self, XStreamError> {
        let definitions = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| VehicleDefinition::compile(i, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { definitions })
    }

    /// Parse a TOML catalog (`[[vehicle]]` tables).
    pub fn from_toml_str(text: &str) -> Result<Self, XStreamError> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::from_records(file.vehicles)
    }

    /// Parse a JSON catalog: either `{"vehicles": [...]}` or a bare array.
    pub fn from_json_str(text: &str) -> Result<Self, XStreamError> {
        let records = match serde_json::from_str::<JsonCatalog>(text)? {
            JsonCatalog::Wrapped(file) => file.vehicles,
            JsonCatalog::Bare(records) => records,
        };
        Self::from_records(records)
    }

    /// Load a catalog file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self, XStreamError> {
        let text = std::fs::read_to_string(path)?;
        let catalog = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            Some("toml") => Self::from_toml_str(&text)?,
            other => {
                return Err(XStreamError::InvalidCatalog(format!(
                    "unsupported catalog extension {other:?} for {}",
                    path.display()
                )));
            }
        };
        tracing::info!(
            path = %path.display(),
            definitions = catalog.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Serialise records back to TOML.
    pub fn records_to_toml(records: &[VehicleRecord]) -> Result<String, XStreamError> {
        let file = CatalogFile {
            vehicles: records.to_vec(),
        };
        toml::to_string_pretty(&file).map_err(|e| XStreamError::Encoding(e.to_string()))
    }

    /// Definitions in enumeration order.
    pub fn definitions(&self) -> &[VehicleDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
