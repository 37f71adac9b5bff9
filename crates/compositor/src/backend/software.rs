//! Software rendering surfaces
//!
//! A [`SoftwareCanvas`] is an ARGB32 pixel grid with a clip-rect list and the
//! drawing operations the compositor needs: rect fills, affine surface blits
//! (translate, rotate about centre, uniform scale about centre, global
//! alpha, nearest-neighbour sampling), convex quad fill/stroke for the
//! resize outline and debug overlays, and a clipped source copy for
//! presentation.
//!
//! Pixels are `u32` in `0xAARRGGBB`; shared window buffers are byte slices in
//! ARGB32 little-endian, which reads as the same value via
//! `u32::from_le_bytes`.

use crate::geometry::{Placement, Rect};

use super::Backend;

/// Parameters for one window blit.
#[derive(Debug, Clone, Copy)]
pub struct BlitOptions {
    /// Destination of the window origin
    pub x: i32,
    pub y: i32,
    /// Clockwise degrees about the window centre
    pub rotation: i32,
    /// Uniform scale about the window centre
    pub scale: f64,
    /// Global opacity in `[0, 1]`
    pub alpha: f64,
}

impl BlitOptions {
    pub fn at(x: i32, y: i32) -> Self {
        BlitOptions { x, y, rotation: 0, scale: 1.0, alpha: 1.0 }
    }
}

/// An ARGB32 surface with a clip region.
pub struct SoftwareCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    clip: Vec<Rect>,
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        SoftwareCanvas {
            width,
            height,
            pixels: vec![0xFF00_0000; (width * height) as usize],
            clip: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixel value, or None outside the surface.
    pub fn pixel_at(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.pixels[(y as u32 * self.width + x as u32) as usize])
    }

    pub fn add_clip(&mut self, rect: Rect) {
        self.clip.push(rect);
    }

    pub fn reset_clip(&mut self) {
        self.clip.clear();
    }

    pub fn clip_rects(&self) -> &[Rect] {
        &self.clip
    }

    /// An empty clip list means unclipped.
    fn in_clip(&self, x: i32, y: i32) -> bool {
        self.clip.is_empty() || self.clip.iter().any(|r| r.contains(x, y))
    }

    /// Fill the whole surface, ignoring the clip.
    pub fn fill(&mut self, argb: u32) {
        self.pixels.fill(argb);
    }

    /// Opaque rect fill through the clip.
    pub fn fill_rect(&mut self, rect: Rect, argb: u32) {
        let x0 = rect.x.max(0);
        let y0 = rect.y.max(0);
        let x1 = (rect.x + rect.width).min(self.width as i32);
        let y1 = (rect.y + rect.height).min(self.height as i32);
        for y in y0..y1 {
            for x in x0..x1 {
                if self.in_clip(x, y) {
                    self.pixels[(y as u32 * self.width + x as u32) as usize] = argb;
                }
            }
        }
    }

    /// Write one pixel unconditionally (debug overlays).
    pub fn put_pixel(&mut self, x: i32, y: i32, argb: u32) {
        if x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32 {
            self.pixels[(y as u32 * self.width + x as u32) as usize] = argb;
        }
    }

    /// Composite an ARGB32 little-endian byte surface.
    ///
    /// Destination pixels are found by walking the transformed bounding box
    /// and inverse-mapping each one into the source, sampling
    /// nearest-neighbour. Source alpha is scaled by `opts.alpha` and blended
    /// src-over.
    pub fn blit_argb(&mut self, src: &[u8], src_w: u32, src_h: u32, opts: &BlitOptions) {
        if src_w == 0 || src_h == 0 || opts.alpha <= 0.0 || opts.scale <= 0.0 {
            return;
        }
        if src.len() < (src_w * src_h * 4) as usize {
            return;
        }

        let placement = Placement {
            x: opts.x,
            y: opts.y,
            width: src_w as i32,
            height: src_h as i32,
            rotation: opts.rotation,
        };

        // The rotated bounds always contain the scaled surface while
        // scale <= 1; growing it by a pixel absorbs rounding.
        let bounds = placement.bounds();
        let x0 = (bounds.x - 1).max(0);
        let y0 = (bounds.y - 1).max(0);
        let x1 = (bounds.x + bounds.width + 1).min(self.width as i32);
        let y1 = (bounds.y + bounds.height + 1).min(self.height as i32);

        let cx = src_w as f64 / 2.0;
        let cy = src_h as f64 / 2.0;
        let rad = -std::f64::consts::PI * (opts.rotation as f64 / 180.0);
        let (sin, cos) = rad.sin_cos();

        for dy in y0..y1 {
            for dx in x0..x1 {
                if !self.in_clip(dx, dy) {
                    continue;
                }

                // Undo translate, then rotation about centre, then scale
                // about centre.
                let px = dx as f64 + 0.5 - opts.x as f64 - cx;
                let py = dy as f64 + 0.5 - opts.y as f64 - cy;
                let rx = px * cos - py * sin;
                let ry = px * sin + py * cos;
                let lx = rx / opts.scale + cx;
                let ly = ry / opts.scale + cy;

                if lx < 0.0 || ly < 0.0 {
                    continue;
                }
                let (sx, sy) = (lx as u32, ly as u32);
                if sx >= src_w || sy >= src_h {
                    continue;
                }

                let idx = ((sy * src_w + sx) * 4) as usize;
                let pixel = u32::from_le_bytes([
                    src[idx],
                    src[idx + 1],
                    src[idx + 2],
                    src[idx + 3],
                ]);

                let out = blend(self.pixels[(dy as u32 * self.width + dx as u32) as usize], pixel, opts.alpha);
                self.pixels[(dy as u32 * self.width + dx as u32) as usize] = out;
            }
        }
    }

    /// Fill a convex quad with a translucent colour.
    pub fn fill_quad(&mut self, quad: [(i32, i32); 4], argb: u32, alpha: f64) {
        let ys: Vec<i32> = quad.iter().map(|p| p.1).collect();
        let y0 = ys.iter().min().copied().unwrap_or(0).max(0);
        let y1 = ys.iter().max().copied().unwrap_or(0).min(self.height as i32 - 1);

        for y in y0..=y1 {
            let mut span: Option<(f64, f64)> = None;
            let scan = y as f64 + 0.5;
            for i in 0..4 {
                let (ax, ay) = quad[i];
                let (bx, by) = quad[(i + 1) % 4];
                let (ay, by) = (ay as f64, by as f64);
                if (scan < ay.min(by)) || (scan >= ay.max(by)) || ay == by {
                    continue;
                }
                let t = (scan - ay) / (by - ay);
                let x = ax as f64 + t * (bx - ax) as f64;
                span = Some(match span {
                    None => (x, x),
                    Some((lo, hi)) => (lo.min(x), hi.max(x)),
                });
            }
            if let Some((lo, hi)) = span {
                let x0 = (lo.floor() as i32).max(0);
                let x1 = (hi.ceil() as i32).min(self.width as i32);
                for x in x0..x1 {
                    if self.in_clip(x, y) {
                        let i = (y as u32 * self.width + x as u32) as usize;
                        self.pixels[i] = blend(self.pixels[i], argb, alpha);
                    }
                }
            }
        }
    }

    /// Stroke the edges of a quad with a 2px pen.
    pub fn stroke_quad(&mut self, quad: [(i32, i32); 4], argb: u32, alpha: f64) {
        for i in 0..4 {
            let a = quad[i];
            let b = quad[(i + 1) % 4];
            self.stroke_line(a, b, argb, alpha);
        }
    }

    fn stroke_line(&mut self, a: (i32, i32), b: (i32, i32), argb: u32, alpha: f64) {
        let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).max(1);
        for t in 0..=steps {
            let x = a.0 + (b.0 - a.0) * t / steps;
            let y = a.1 + (b.1 - a.1) * t / steps;
            for oy in 0..2 {
                for ox in 0..2 {
                    let (px, py) = (x + ox, y + oy);
                    if px >= 0
                        && py >= 0
                        && px < self.width as i32
                        && py < self.height as i32
                        && self.in_clip(px, py)
                    {
                        let i = (py as u32 * self.width + px as u32) as usize;
                        self.pixels[i] = blend(self.pixels[i], argb, alpha);
                    }
                }
            }
        }
    }

    /// Source-copy the clipped region of `other` into this surface.
    pub fn copy_clipped_from(&mut self, other: &SoftwareCanvas) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let rects: Vec<Rect> = if self.clip.is_empty() {
            vec![Rect::new(0, 0, self.width as i32, self.height as i32)]
        } else {
            self.clip.clone()
        };
        for rect in rects {
            let x0 = rect.x.max(0);
            let y0 = rect.y.max(0);
            let x1 = (rect.x + rect.width).min(self.width as i32);
            let y1 = (rect.y + rect.height).min(self.height as i32);
            for y in y0..y1 {
                let row = (y as u32 * self.width) as usize;
                let (lo, hi) = (row + x0 as usize, row + x1 as usize);
                if lo < hi {
                    self.pixels[lo..hi].copy_from_slice(&other.pixels[lo..hi]);
                }
            }
        }
    }
}

/// Straight-alpha src-over with a global alpha factor.
fn blend(dst: u32, src: u32, alpha: f64) -> u32 {
    let sa = ((src >> 24) & 0xff) as f64 / 255.0 * alpha.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return 0xFF00_0000 | (src & 0x00FF_FFFF);
    }

    let channel = |shift: u32| {
        let s = ((src >> shift) & 0xff) as f64;
        let d = ((dst >> shift) & 0xff) as f64;
        ((s * sa + d * (1.0 - sa)) as u32).min(255) << shift
    };

    0xFF00_0000 | channel(16) | channel(8) | channel(0)
}

/// CPU double buffer: the virtual framebuffer the server runs against.
pub struct SoftwareBackend {
    back: SoftwareCanvas,
    front: SoftwareCanvas,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        SoftwareBackend {
            back: SoftwareCanvas::new(width, height),
            front: SoftwareCanvas::new(width, height),
        }
    }
}

impl Backend for SoftwareBackend {
    fn size(&self) -> (u32, u32) {
        (self.back.width, self.back.height)
    }

    fn canvas(&mut self) -> &mut SoftwareCanvas {
        &mut self.back
    }

    fn add_clip(&mut self, rect: Rect) {
        self.back.add_clip(rect);
        self.front.add_clip(rect);
    }

    fn reset_clip(&mut self) {
        self.back.reset_clip();
        self.front.reset_clip();
    }

    fn present(&mut self) {
        self.front.copy_clipped_from(&self.back);
    }

    fn front(&self) -> &SoftwareCanvas {
        &self.front
    }
}
