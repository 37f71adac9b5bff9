//! Font preloading
//!
//! Clients render their own text, but they all need the same font files; the
//! server reads each one once at startup and publishes it as a shared-memory
//! region under `sys.<ident>.fonts.<identifier>`, so clients map instead of
//! re-reading. A missing font file is a fatal startup error.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shm::{font_key, ProcessShm, ShmError};

/// Identifier-to-filename table of the fonts every client can expect.
pub const FONTS: [(&str, &str); 8] = [
    ("sans-serif", "DejaVuSans.ttf"),
    ("sans-serif.bold", "DejaVuSans-Bold.ttf"),
    ("sans-serif.italic", "DejaVuSans-Oblique.ttf"),
    ("sans-serif.bolditalic", "DejaVuSans-BoldOblique.ttf"),
    ("monospace", "DejaVuSansMono.ttf"),
    ("monospace.bold", "DejaVuSansMono-Bold.ttf"),
    ("monospace.italic", "DejaVuSansMono-Oblique.ttf"),
    ("monospace.bolditalic", "DejaVuSansMono-BoldOblique.ttf"),
];

/// Font preloading errors
#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish font region: {0}")]
    Shm(#[from] ShmError),
}

/// Read every font in [`FONTS`] and publish it to the shared-memory
/// namespace.
pub fn preload(shm: &ProcessShm, ident: &str, font_dir: &Path) -> Result<(), FontError> {
    for (identifier, filename) in FONTS {
        let path = font_dir.join(filename);
        let bytes = std::fs::read(&path).map_err(|source| FontError::Io {
            path: path.clone(),
            source,
        })?;

        let key = font_key(ident, identifier);
        let region = shm.obtain(&key, bytes.len())?;
        region.with_mut(|dst| dst.copy_from_slice(&bytes));
        tracing::info!(font = identifier, ?path, size = bytes.len(), "font published");
    }
    Ok(())
}
