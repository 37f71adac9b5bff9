//! The per-frame compositor
//!
//! The render thread wakes roughly every 16.6 ms, turns the damage queue
//! into a clip region, and repaints every window that animation or damage
//! touched, bottom band first, then MID back to front, then the top band.
//! Windows whose fade-out ran to completion are collected during the blit
//! pass and destroyed after the frame is presented, which is the only place
//! windows actually die.
//!
//! Whole windows are repainted whenever they intersect the clip; damage is
//! not clipped to sub-rectangles of a window.

use std::time::Duration;

use protocol::{WindowId, ZBand};

use crate::backend::{Backend, BlitOptions, SoftwareCanvas};
use crate::cursor::CursorSprite;
use crate::geometry::Rect;
use crate::input::POINTER_SCALE;
use crate::server::{Outbox, Server};
use crate::shm::window_buffer_key;
use crate::state::{AnimMode, Window, ANIM_LENGTH};

/// Target frame pacing (~60 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_666);

/// Edge of the square damaged around the pointer each time it moves.
const CURSOR_DAMAGE: i32 = 64;

/// Half-edge of the hit-test visualiser probe square.
const SHAPE_PROBE: i32 = 20;

/// Deterministic per-window debug colour.
pub fn color_for_wid(wid: WindowId) -> u32 {
    const COLORS: [u32; 14] = [
        0xFF19AEFF,
        0xFFFF4141,
        0xFFFFFF3E,
        0xFFFF6600,
        0xFF9ADE00,
        0xFFD76CFF,
        0xFF364E59,
        0xFF0084C8,
        0xFFDC0000,
        0xFFFF9900,
        0xFF009100,
        0xFFBA00FF,
        0xFFB88100,
        0xFF9EABB0,
    ];
    COLORS[wid.0 as usize % COLORS.len()]
}

fn cursor_rect(sub_x: i32, sub_y: i32) -> Rect {
    Rect::new(
        sub_x / POINTER_SCALE - crate::cursor::HOTSPOT_X,
        sub_y / POINTER_SCALE - crate::cursor::HOTSPOT_Y,
        CURSOR_DAMAGE,
        CURSOR_DAMAGE,
    )
}

impl Server {
    /// Run the compositor until the process exits.
    pub fn render_loop(&self, backend: &mut dyn Backend, cursor: Option<&CursorSprite>) -> ! {
        // Force a cursor repaint on the very first frame
        let mut last_pointer = (-1, -1);
        loop {
            self.compose(backend, cursor, &mut last_pointer);
            std::thread::sleep(FRAME_INTERVAL);
        }
    }

    /// Compose one frame. Does nothing when no damage accumulated.
    pub fn compose(
        &self,
        backend: &mut dyn Backend,
        cursor: Option<&CursorSprite>,
        last_pointer: &mut (i32, i32),
    ) {
        // Latch the pointer; motion damages the old and new cursor squares.
        let pointer = self.pointer();
        if (pointer.x, pointer.y) != *last_pointer {
            self.damage.mark_region(cursor_rect(last_pointer.0, last_pointer.1));
            self.damage.mark_region(cursor_rect(pointer.x, pointer.y));
            *last_pointer = (pointer.x, pointer.y);
        }

        let tick = self.advance_tick();

        // Animating windows re-damage themselves every frame.
        {
            let stage = self.stage.lock().unwrap();
            for wid in stage.blit_order() {
                if let Some(win) = stage.lookup(wid) {
                    if win.anim_mode != AnimMode::None {
                        self.damage.mark_window(win);
                    }
                }
            }
        }

        let rects = self.damage.drain();
        if rects.is_empty() {
            return;
        }
        for rect in &rects {
            backend.add_clip(*rect);
        }

        let mut outbox = Outbox::new();
        let mut close_queue: Vec<WindowId> = Vec::new();
        {
            let mut stage = self.stage.lock().unwrap();
            let debug = stage.debug;

            for wid in stage.blit_order() {
                if let Some(win) = stage.lookup_mut(wid) {
                    blit_window(backend.canvas(), win, tick, debug.bounds, &mut close_queue);
                }
            }

            if let Some(outline) = stage.resize_outline {
                if let Some(win) = stage.lookup(outline.wid) {
                    let placement = win.placement();
                    let quad = [
                        placement.to_device(0, 0),
                        placement.to_device(outline.width, 0),
                        placement.to_device(outline.width, outline.height),
                        placement.to_device(0, outline.height),
                    ];
                    let canvas = backend.canvas();
                    canvas.fill_quad(quad, 0xFF54_8CFF, 0.5);
                    canvas.stroke_quad(quad, 0xFF00_66FF, 0.9);
                }
            }

            if debug.shapes {
                let (mx, my) = (pointer.x / POINTER_SCALE, pointer.y / POINTER_SCALE);
                let (width, height) = self.size();
                let y0 = (my - SHAPE_PROBE).max(0);
                let y1 = (my + SHAPE_PROBE).min(height as i32);
                let x0 = (mx - SHAPE_PROBE).max(0);
                let x1 = (mx + SHAPE_PROBE).min(width as i32);
                for y in y0..y1 {
                    for x in x0..x1 {
                        if let Some(wid) = stage.hit_test(x, y) {
                            backend.canvas().put_pixel(x, y, color_for_wid(wid));
                        }
                    }
                }
            }

            if let Some(sprite) = cursor {
                sprite.draw(
                    backend.canvas(),
                    pointer.x / POINTER_SCALE,
                    pointer.y / POINTER_SCALE,
                );
            }

            backend.present();

            // Fade-outs that completed this frame die here, after present.
            for wid in close_queue {
                let was_focused = stage.focused == Some(wid);
                if let Some(win) = stage.destroy(wid) {
                    self.damage.mark_window(&win);
                    self.shm.release(&window_buffer_key(self.ident(), wid, win.bufid));
                    if win.pending_bufid != 0 {
                        self.shm.release(&window_buffer_key(self.ident(), wid, win.pending_bufid));
                    }
                    tracing::info!(%wid, owner = %win.owner, "window closed");
                    if was_focused {
                        self.focus_fallback(&mut stage, &mut outbox);
                    }
                    self.queue_notify(&mut outbox);
                }
            }
        }

        backend.reset_clip();
        self.flush(outbox);
    }
}

/// Paint one window into the backbuffer, honouring its animation.
fn blit_window(
    canvas: &mut SoftwareCanvas,
    win: &mut Window,
    tick: u64,
    debug_bounds: bool,
    close_queue: &mut Vec<WindowId>,
) {
    let in_mid = win.z == ZBand::Mid;
    let mut opts = BlitOptions::at(win.x, win.y);
    if in_mid && win.rotation != 0 {
        opts.rotation = win.rotation;
    }

    if win.anim_mode != AnimMode::None {
        let frame = tick.saturating_sub(win.anim_start);
        if frame >= ANIM_LENGTH {
            if win.anim_mode == AnimMode::FadeOut {
                close_queue.push(win.wid);
                return;
            }
            win.anim_mode = AnimMode::None;
            win.anim_start = 0;
        } else {
            let frame = if win.anim_mode == AnimMode::FadeOut { ANIM_LENGTH - frame } else { frame };
            let alpha = frame as f64 / ANIM_LENGTH as f64;
            opts.alpha = alpha;
            // The pop-in scale applies only to MID windows
            if in_mid {
                opts.scale = 0.75 + 0.25 * alpha;
            }
        }
    }

    win.buffer.with(|bytes| canvas.blit_argb(bytes, win.width, win.height, &opts));

    if debug_bounds {
        canvas.fill_quad(win.placement().corner_quad(), color_for_wid(win.wid), 0.7);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use protocol::ClientId;

    use crate::backend::SoftwareBackend;
    use crate::channel::ServerChannel;
    use crate::shm::ProcessShm;
    use crate::state::TICKS_PER_FRAME;

    use super::*;

    fn server(width: u32, height: u32) -> Server {
        Server::new(
            "render-test".into(),
            width,
            height,
            ServerChannel::bind(),
            Arc::new(ProcessShm::new()),
        )
    }

    fn paint_opaque(server: &Server, wid: WindowId, argb: u32) {
        let stage = server.stage.lock().unwrap();
        let win = stage.lookup(wid).unwrap();
        win.buffer.with_mut(|bytes| {
            for px in bytes.chunks_exact_mut(4) {
                px.copy_from_slice(&argb.to_le_bytes());
            }
        });
    }

    fn finish_fade_in(server: &Server, backend: &mut SoftwareBackend) {
        let frames = ANIM_LENGTH / TICKS_PER_FRAME + 2;
        let mut last = (-1, -1);
        for _ in 0..frames {
            let stage = server.stage.lock().unwrap();
            for wid in stage.blit_order() {
                server.damage.mark_window(stage.lookup(wid).unwrap());
            }
            drop(stage);
            server.compose(backend, None, &mut last);
        }
    }

    #[test]
    fn compose_without_damage_is_a_no_op() {
        let server = server(64, 64);
        let mut backend = SoftwareBackend::new(64, 64);
        let mut last = (server.pointer().x, server.pointer().y);

        let before = backend.front().pixels().to_vec();
        server.compose(&mut backend, None, &mut last);
        assert_eq!(backend.front().pixels(), &before[..]);
    }

    #[test]
    fn damaged_window_reaches_the_front_surface() {
        let server = server(64, 64);
        let mut backend = SoftwareBackend::new(64, 64);
        let wid = {
            let mut stage = server.stage.lock().unwrap();
            server.create_window(&mut stage, ClientId(1), 16, 16).unwrap().0
        };
        paint_opaque(&server, wid, 0xFFAA_0000);
        finish_fade_in(&server, &mut backend);

        // Fully faded in: the window's pixels are on the front surface
        assert_eq!(backend.front().pixel_at(5, 5), Some(0xFFAA_0000));
        let stage = server.stage.lock().unwrap();
        assert_eq!(stage.lookup(wid).unwrap().anim_mode, AnimMode::None);
    }

    #[test]
    fn second_compose_after_flip_is_a_no_op() {
        let server = server(64, 64);
        let mut backend = SoftwareBackend::new(64, 64);
        let wid = {
            let mut stage = server.stage.lock().unwrap();
            server.create_window(&mut stage, ClientId(1), 16, 16).unwrap().0
        };
        paint_opaque(&server, wid, 0xFF00_BB00);
        finish_fade_in(&server, &mut backend);

        let mut last = (server.pointer().x, server.pointer().y);
        {
            let stage = server.stage.lock().unwrap();
            server.damage.mark_window(stage.lookup(wid).unwrap());
        }
        server.compose(&mut backend, None, &mut last);
        let after_first = backend.front().pixels().to_vec();

        server.compose(&mut backend, None, &mut last);
        assert_eq!(backend.front().pixels(), &after_first[..]);
        assert_eq!(server.damage.pending(), 0);
    }

    #[test]
    fn fade_out_destroys_exactly_once_and_releases_the_buffer() {
        let server = server(64, 64);
        let mut backend = SoftwareBackend::new(64, 64);
        let (wid, bufid) = {
            let mut stage = server.stage.lock().unwrap();
            server.create_window(&mut stage, ClientId(1), 16, 16).unwrap()
        };
        finish_fade_in(&server, &mut backend);

        let key = window_buffer_key(server.ident(), wid, bufid);
        assert!(server.shm.contains(&key));

        {
            let mut stage = server.stage.lock().unwrap();
            let tick = server.tick();
            stage.mark_for_close(wid, tick);
        }

        let mut last = (-1, -1);
        let frames = ANIM_LENGTH / TICKS_PER_FRAME + 2;
        for _ in 0..frames {
            server.compose(&mut backend, None, &mut last);
        }

        let stage = server.stage.lock().unwrap();
        assert!(!stage.contains(wid));
        assert_eq!(stage.window_count(), 0);
        assert!(!server.shm.contains(&key));
    }

    #[test]
    fn pointer_motion_damages_two_cursor_squares() {
        let server = server(640, 480);
        {
            let mut pointer = server.pointer_mut();
            pointer.x = 300;
            pointer.y = 300;
        }
        let mut backend = SoftwareBackend::new(640, 480);
        let mut last = (0, 0);
        server.compose(&mut backend, None, &mut last);
        assert_eq!(last, (300, 300));
    }
}
