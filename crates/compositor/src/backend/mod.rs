//! Display backend abstraction
//!
//! The renderer paints into a backbuffer and presents damaged regions to a
//! front surface; what sits behind the front surface (a hardware framebuffer,
//! a nested host window) is a backend concern. The trait carries exactly the
//! operations the render loop needs:
//!
//! - a backbuffer [`SoftwareCanvas`] to paint into,
//! - a clip region applied to both surfaces,
//! - a clipped source-copy present.
//!
//! One implementation exists: [`SoftwareBackend`], a pure-CPU double buffer
//! used for the virtual framebuffer and for headless tests.

mod software;

pub use software::{BlitOptions, SoftwareBackend, SoftwareCanvas};

use crate::geometry::Rect;

/// A display target the renderer can paint to and present on.
pub trait Backend: Send {
    /// Output size in pixels.
    fn size(&self) -> (u32, u32);

    /// The backbuffer all window blits land in.
    fn canvas(&mut self) -> &mut SoftwareCanvas;

    /// Extend the damage clip on both the backbuffer and the front surface.
    fn add_clip(&mut self, rect: Rect);

    /// Drop the clip region on both surfaces at the end of a frame.
    fn reset_clip(&mut self);

    /// Copy the clipped region of the backbuffer to the front surface
    /// (source operator, no blending).
    fn present(&mut self);

    /// The presented surface, for screen observation.
    fn front(&self) -> &SoftwareCanvas;
}
