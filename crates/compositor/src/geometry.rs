//! Screen-space geometry and the window rotation mapping
//!
//! The compositor deals with two coordinate systems:
//! - Device: absolute screen pixels, origin top-left
//! - Local: window-relative pixels, origin at the window's top-left corner
//!
//! Windows in the MID band may be rotated about their centre; the mapping
//! between the two systems goes through [`Placement`]. BOTTOM and TOP windows
//! are never rotated, so for them the mapping is a pure translation.

/// A screen-space rectangle. Damage, clips, and window bounds all use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    /// Whether a point lies inside the rectangle (half-open on both axes)
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Whether two rectangles overlap
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// Intersection clamped to `other`, or None when disjoint
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

/// A window's position, size, and rotation on screen.
///
/// Rotation is in integer degrees, positive clockwise, about the window
/// centre. The inverse mapping ([`Placement::to_local`]) is what hit-testing
/// and click routing use; the forward mapping ([`Placement::to_device`])
/// produces damage bounds and debug quads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub rotation: i32,
}

impl Placement {
    /// Map a device coordinate into window-local space.
    pub fn to_local(&self, x: i32, y: i32) -> (i32, i32) {
        let lx = x - self.x;
        let ly = y - self.y;
        if self.rotation == 0 {
            return (lx, ly);
        }

        let cx = self.width / 2;
        let cy = self.height / 2;
        let tx = (lx - cx) as f64;
        let ty = (ly - cy) as f64;

        let r = -std::f64::consts::PI * (self.rotation as f64 / 180.0);
        let (s, c) = r.sin_cos();

        let nx = tx * c - ty * s;
        let ny = tx * s + ty * c;

        (nx.round() as i32 + cx, ny.round() as i32 + cy)
    }

    /// Map a window-local coordinate onto the screen.
    pub fn to_device(&self, x: i32, y: i32) -> (i32, i32) {
        if self.rotation == 0 {
            return (self.x + x, self.y + y);
        }

        let cx = self.width / 2;
        let cy = self.height / 2;
        let tx = (x - cx) as f64;
        let ty = (y - cy) as f64;

        let r = std::f64::consts::PI * (self.rotation as f64 / 180.0);
        let (s, c) = r.sin_cos();

        let nx = tx * c - ty * s;
        let ny = tx * s + ty * c;

        (nx.round() as i32 + cx + self.x, ny.round() as i32 + cy + self.y)
    }

    /// Screen-space bounding box of the whole window.
    pub fn bounds(&self) -> Rect {
        self.bounds_of(0, 0, self.width, self.height)
    }

    /// Screen-space bounding box of a window-local rectangle.
    ///
    /// For unrotated windows this is a translation; otherwise the box spans
    /// the four forward-rotated corners.
    pub fn bounds_of(&self, x: i32, y: i32, width: i32, height: i32) -> Rect {
        if self.rotation == 0 {
            return Rect::new(self.x + x, self.y + y, width, height);
        }

        let corners = [
            self.to_device(x, y),
            self.to_device(x, y + height),
            self.to_device(x + width, y),
            self.to_device(x + width, y + height),
        ];

        let left = corners.iter().map(|c| c.0).min().unwrap_or(0);
        let top = corners.iter().map(|c| c.1).min().unwrap_or(0);
        let right = corners.iter().map(|c| c.0).max().unwrap_or(0);
        let bottom = corners.iter().map(|c| c.1).max().unwrap_or(0);

        Rect::new(left, top, right - left, bottom - top)
    }

    /// The four window corners in device space, clockwise from the origin.
    pub fn corner_quad(&self) -> [(i32, i32); 4] {
        [
            self.to_device(0, 0),
            self.to_device(self.width, 0),
            self.to_device(self.width, self.height),
            self.to_device(0, self.height),
        ]
    }
}
