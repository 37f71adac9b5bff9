//! Damage accumulation between frames
//!
//! Clients, the interaction machine, and the renderer itself append screen
//! rectangles here; the renderer drains the queue once per frame and unions
//! everything into the clip region. Rectangles are never coalesced at this
//! level.

use std::sync::Mutex;

use crate::geometry::Rect;
use crate::state::Window;

/// Lock-guarded queue of damage rectangles.
#[derive(Default)]
pub struct DamageQueue {
    rects: Mutex<Vec<Rect>>,
}

impl DamageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw screen-space rectangle.
    pub fn mark_region(&self, rect: Rect) {
        self.rects.lock().unwrap().push(rect);
    }

    /// Queue the screen-space bounding box of a whole window. For rotated
    /// windows this spans the four forward-rotated corners.
    pub fn mark_window(&self, window: &Window) {
        self.mark_region(window.placement().bounds());
    }

    /// Queue the bounding box of a window-local rectangle.
    pub fn mark_window_relative(&self, window: &Window, x: i32, y: i32, width: i32, height: i32) {
        self.mark_region(window.placement().bounds_of(x, y, width, height));
    }

    /// Take every queued rectangle, leaving the queue empty.
    pub fn drain(&self) -> Vec<Rect> {
        std::mem::take(&mut *self.rects.lock().unwrap())
    }

    pub fn pending(&self) -> usize {
        self.rects.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::ProcessShm;
    use crate::state::registry_test_support::plain_window;

    #[test]
    fn drain_empties_the_queue() {
        let damage = DamageQueue::new();
        damage.mark_region(Rect::new(0, 0, 10, 10));
        damage.mark_region(Rect::new(5, 5, 10, 10));
        assert_eq!(damage.pending(), 2);

        let rects = damage.drain();
        assert_eq!(rects.len(), 2);
        assert_eq!(damage.pending(), 0);
        assert!(damage.drain().is_empty());
    }

    #[test]
    fn unrotated_window_damage_is_its_rect() {
        let shm = ProcessShm::new();
        let win = plain_window(&shm, 7, 9, 20, 10);
        let damage = DamageQueue::new();
        damage.mark_window(&win);
        assert_eq!(damage.drain(), vec![Rect::new(7, 9, 20, 10)]);
    }

    #[test]
    fn rotated_window_damage_covers_the_rotated_box() {
        let shm = ProcessShm::new();
        let mut win = plain_window(&shm, 0, 0, 40, 10);
        win.rotation = 90;
        let damage = DamageQueue::new();
        damage.mark_window(&win);

        let rect = damage.drain()[0];
        // A quarter turn of a 40x10 window spans roughly 10x40 about the centre
        assert!(rect.width <= 12, "width {}", rect.width);
        assert!(rect.height >= 38, "height {}", rect.height);
    }

    #[test]
    fn relative_damage_is_offset_by_the_window_origin() {
        let shm = ProcessShm::new();
        let win = plain_window(&shm, 100, 50, 64, 64);
        let damage = DamageQueue::new();
        damage.mark_window_relative(&win, 4, 8, 16, 2);
        assert_eq!(damage.drain(), vec![Rect::new(104, 58, 16, 2)]);
    }
}
