//! Cursor sprite
//!
//! The pointer is drawn by the compositor itself (no hardware cursor): a
//! 64x64 ARGB32 sprite composited over the backbuffer every frame, except in
//! nested mode where the host draws its own pointer. The sprite is loaded
//! from a raw pre-decoded pixel file; a missing or malformed file is a fatal
//! startup error in fullscreen mode.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::backend::{BlitOptions, SoftwareCanvas};

/// Sprite edge length in pixels.
pub const CURSOR_SIZE: u32 = 64;

/// Hotspot offset from the sprite origin to the pointer tip.
pub const HOTSPOT_X: i32 = 26;
pub const HOTSPOT_Y: i32 = 16;

/// Cursor loading errors
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to read cursor sprite: {0}")]
    Io(#[from] io::Error),

    #[error("cursor sprite has {len} bytes, expected {expected}")]
    BadSize { len: usize, expected: usize },
}

/// A pre-decoded ARGB32 pointer sprite.
pub struct CursorSprite {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl CursorSprite {
    /// Load a raw 64x64 ARGB32 little-endian sprite file.
    pub fn load(path: &Path) -> Result<Self, CursorError> {
        let pixels = std::fs::read(path)?;
        let expected = (CURSOR_SIZE * CURSOR_SIZE * 4) as usize;
        if pixels.len() != expected {
            return Err(CursorError::BadSize { len: pixels.len(), expected });
        }
        tracing::info!(?path, "cursor sprite loaded");
        Ok(CursorSprite { width: CURSOR_SIZE, height: CURSOR_SIZE, pixels })
    }

    /// Build a sprite from pixels already in memory (tests, nested mode).
    pub fn from_argb(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        CursorSprite { width, height, pixels }
    }

    /// Composite the sprite with its tip at the given screen position.
    pub fn draw(&self, canvas: &mut SoftwareCanvas, x: i32, y: i32) {
        canvas.blit_argb(
            &self.pixels,
            self.width,
            self.height,
            &BlitOptions::at(x - HOTSPOT_X, y - HOTSPOT_Y),
        );
    }
}
