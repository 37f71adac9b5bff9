//! Server-side window state
//!
//! [`Window`] is the arena entry for one client window; [`Stage`] owns the
//! arena, the three z-bands, the per-client buckets, and the pointers the
//! interaction machine leaves behind (focus, hover, resize outline, debug
//! overlays). Everything that must stay consistent under the registry lock
//! lives here; the [`Stage`] sits behind a single `Mutex` on the server.
//!
//! Cross-references are ids, not references: the focus, hover, and capture
//! pointers are `WindowId`s validated on lookup, so destroying a window can
//! never leave a dangling reference, only a stale id that the next lookup
//! rejects.

pub mod registry;

use std::collections::HashMap;

use protocol::{Advertisement, ClientId, WindowId, ZBand};

use crate::geometry::Placement;
use crate::shm::SharedBuffer;

/// Ticks a fade animation runs for.
pub const ANIM_LENGTH: u64 = 256;

/// Tick increment per composed frame.
pub const TICKS_PER_FRAME: u64 = 10;

/// Entry/exit animation state of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimMode {
    None,
    FadeIn,
    FadeOut,
}

/// One window: a shared framebuffer placed on the stage.
#[derive(Debug)]
pub struct Window {
    pub wid: WindowId,
    pub owner: ClientId,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub z: ZBand,
    pub buffer: SharedBuffer,
    pub bufid: u32,
    /// Set only while a resize handshake is in flight
    pub pending_buffer: Option<SharedBuffer>,
    pub pending_bufid: u32,
    /// Clockwise degrees; honoured only in the MID band
    pub rotation: i32,
    /// Pixels with alpha below this never hit
    pub alpha_threshold: u8,
    pub anim_mode: AnimMode,
    pub anim_start: u64,
    /// Client-supplied metadata shown to subscribers
    pub ad: Option<Advertisement>,
}

impl Window {
    /// Placement used for every coordinate mapping. BOTTOM and TOP windows
    /// render unrotated, so their placement carries rotation 0 regardless of
    /// the stored angle.
    pub fn placement(&self) -> Placement {
        Placement {
            x: self.x,
            y: self.y,
            width: self.width as i32,
            height: self.height as i32,
            rotation: if self.z == ZBand::Mid { self.rotation } else { 0 },
        }
    }

    /// Whether the window is in the single-slot BOTTOM or TOP band.
    pub fn is_banded(&self) -> bool {
        self.z != ZBand::Mid
    }

    /// Hit test at a device coordinate: inside the (inverse-rotated) bounds
    /// and at least `alpha_threshold` opaque at that pixel.
    pub fn hit_at(&self, x: i32, y: i32) -> bool {
        let (lx, ly) = self.placement().to_local(x, y);
        if lx < 0 || ly < 0 || lx >= self.width as i32 || ly >= self.height as i32 {
            return false;
        }
        let index = ly as usize * self.width as usize + lx as usize;
        match self.buffer.alpha_at(index) {
            Some(alpha) => alpha >= self.alpha_threshold,
            None => false,
        }
    }
}

/// The translucent outline drawn while an interactive resize is in flight.
#[derive(Debug, Clone, Copy)]
pub struct ResizeOutline {
    pub wid: WindowId,
    pub width: i32,
    pub height: i32,
}

/// Debug overlay toggles (CTRL+SHIFT+V / CTRL+SHIFT+B)
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOverlays {
    /// Paint the hit-test result around the pointer
    pub shapes: bool,
    /// Paint each window's rotated bounds quad
    pub bounds: bool,
}

/// The window registry plus interaction-visible state, guarded by the
/// server's registry lock.
pub struct Stage {
    windows: HashMap<WindowId, Window>,
    bottom: Option<WindowId>,
    top: Option<WindowId>,
    /// MID band, back to front
    mid: Vec<WindowId>,
    by_client: HashMap<ClientId, Vec<WindowId>>,

    pub focused: Option<WindowId>,
    pub hover: Option<WindowId>,
    pub resize_outline: Option<ResizeOutline>,
    pub debug: DebugOverlays,

    next_wid: u32,
    next_bufid: u32,
}

impl Stage {
    pub fn new() -> Self {
        Stage {
            windows: HashMap::new(),
            bottom: None,
            top: None,
            mid: Vec::new(),
            by_client: HashMap::new(),
            focused: None,
            hover: None,
            resize_outline: None,
            debug: DebugOverlays::default(),
            next_wid: 1,
            next_bufid: 1,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod registry_test_support {
    use super::*;
    use crate::shm::ProcessShm;

    /// An opaque unrotated MID window for unit tests.
    pub fn plain_window(shm: &ProcessShm, x: i32, y: i32, width: u32, height: u32) -> Window {
        let buffer = shm
            .obtain(&format!("test.{x}.{y}.{width}x{height}"), (width * height * 4) as usize)
            .unwrap();
        buffer.with_mut(|bytes| bytes.fill(0xFF));
        Window {
            wid: WindowId(1),
            owner: ClientId(1),
            x,
            y,
            width,
            height,
            z: ZBand::Mid,
            buffer,
            bufid: 1,
            pending_buffer: None,
            pending_bufid: 0,
            rotation: 0,
            alpha_threshold: 0,
            anim_mode: AnimMode::None,
            anim_start: 0,
            ad: None,
        }
    }
}
