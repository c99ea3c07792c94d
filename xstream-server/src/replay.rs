//! Replay host: serves dumped buffers as if a host had rendered them.

use std::path::Path;
use std::sync::Arc;

use xstream_core::capture::{CANDIDATE_TAG, DumpFile, list_dumps, read_dump};
use xstream_core::{MemoryHost, StaticIdentity, XStreamError};

use crate::config::ReplayConfig;

/// Buffers loaded from a dump directory.
#[derive(Debug)]
pub struct ReplaySource {
    pub host: Arc<MemoryHost>,
    pub files: Vec<DumpFile>,
}

impl ReplaySource {
    /// Load every dump file in `dir` into an in-memory host, keyed by the
    /// id in its file name. Unreadable files are skipped with a warning.
    pub fn load(dir: &Path) -> Result<Self, XStreamError> {
        let host = Arc::new(MemoryHost::new());
        let mut files = Vec::new();

        for (path, file) in list_dumps(dir)? {
            match read_dump(&path) {
                Ok((file, pixels)) => {
                    host.insert(file.id, file.width, file.height, pixels)?;
                    tracing::debug!(texture = %file.id, tag = %file.tag, "replay buffer loaded");
                    files.push(file);
                }
                Err(e) => tracing::warn!(path = %path.display(), id = %file.id, "skipping dump: {e}"),
            }
        }

        if files.is_empty() {
            return Err(XStreamError::Other(format!(
                "no dump files in {}",
                dir.display()
            )));
        }
        tracing::info!(dir = %dir.display(), buffers = files.len(), "replay host ready");
        Ok(Self { host, files })
    }

    /// Identity to report: configured values, with the type code taken
    /// from the dump tags when not configured.
    pub fn identity(&self, config: &ReplayConfig) -> StaticIdentity {
        let type_code = if config.type_code.is_empty() {
            self.files
                .iter()
                .map(|f| f.tag.as_str())
                .find(|tag| *tag != CANDIDATE_TAG)
                .unwrap_or_default()
                .to_string()
        } else {
            config.type_code.clone()
        };
        StaticIdentity::new(config.author.clone(), type_code)
    }
}

// ── Tests ────────────────────────────────────────────────────────
