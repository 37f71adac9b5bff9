//! Named shared-memory regions
//!
//! Window framebuffers and preloaded fonts live in named byte regions that
//! both the server and a client can map. The real system primitive is an OS
//! facility; this module defines its contract and an in-process
//! implementation backed by reference-counted buffers, which is what the
//! server links against and what the tests exercise.
//!
//! Naming scheme:
//! - fonts: `sys.<ident>.fonts.<identifier>`
//! - window buffers: `<ident>.win.<wid>.<bufid>`
//!
//! A region stays alive while any handle to it exists; `release` only drops
//! the name so that the bytes disappear once the last handle goes away. That
//! mirrors the unlink-style semantics the resize handshake depends on: the
//! old buffer outlives its release until the client stops drawing into it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use protocol::WindowId;

/// Shared-memory errors
#[derive(Debug, Error)]
pub enum ShmError {
    /// A region with this key exists at a different size
    #[error("region {key} exists with size {existing}, wanted {wanted}")]
    SizeMismatch {
        key: String,
        existing: usize,
        wanted: usize,
    },
}

/// Handle to one named region. Clones share the same bytes.
#[derive(Clone)]
pub struct SharedBuffer {
    key: String,
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    fn new(key: String, size: usize) -> Self {
        SharedBuffer {
            key,
            data: Arc::new(Mutex::new(vec![0u8; size])),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the bytes for the duration of the closure.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.lock().unwrap())
    }

    /// Write access to the bytes for the duration of the closure.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.lock().unwrap())
    }

    /// Alpha byte of the ARGB32 pixel at `index`, if in range.
    pub fn alpha_at(&self, index: usize) -> Option<u8> {
        let data = self.data.lock().unwrap();
        data.get(index * 4 + 3).copied()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("key", &self.key)
            .field("len", &self.len())
            .finish()
    }
}

/// The in-process shared-memory namespace.
#[derive(Default)]
pub struct ProcessShm {
    regions: Mutex<HashMap<String, SharedBuffer>>,
}

impl ProcessShm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the region if it does not exist (zero-filled), else return the
    /// existing one.
    pub fn obtain(&self, key: &str, size: usize) -> Result<SharedBuffer, ShmError> {
        let mut regions = self.regions.lock().unwrap();
        if let Some(existing) = regions.get(key) {
            let existing_len = existing.len();
            if existing_len != size {
                return Err(ShmError::SizeMismatch {
                    key: key.to_string(),
                    existing: existing_len,
                    wanted: size,
                });
            }
            return Ok(existing.clone());
        }
        let buffer = SharedBuffer::new(key.to_string(), size);
        regions.insert(key.to_string(), buffer.clone());
        Ok(buffer)
    }

    /// Open an existing region by name (what a client does after
    /// `WINDOW_INIT` or `RESIZE_BUFID`).
    pub fn open(&self, key: &str) -> Option<SharedBuffer> {
        self.regions.lock().unwrap().get(key).cloned()
    }

    /// Drop the name. Outstanding handles keep the bytes alive.
    pub fn release(&self, key: &str) {
        self.regions.lock().unwrap().remove(key);
    }

    pub fn region_count(&self) -> usize {
        self.regions.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.regions.lock().unwrap().contains_key(key)
    }
}

/// Shm key for a preloaded font.
pub fn font_key(ident: &str, font: &str) -> String {
    format!("sys.{ident}.fonts.{font}")
}

/// Shm key for a window framebuffer.
pub fn window_buffer_key(ident: &str, wid: WindowId, bufid: u32) -> String {
    format!("{ident}.win.{}.{bufid}", wid.0)
}
