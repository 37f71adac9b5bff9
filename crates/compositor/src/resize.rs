//! The resize handshake
//!
//! Resizing is a three-step exchange so the client never draws into a buffer
//! the compositor is tearing down:
//!
//! 1. the server (or the client itself) offers a size;
//! 2. the client accepts, and the server allocates a *pending* buffer next
//!    to the live one and names it in `RESIZE_BUFID`;
//! 3. the client paints the pending buffer and sends `RESIZE_DONE`, at which
//!    point the server swaps buffers, releases the old region, and damages
//!    both the old and new bounds.
//!
//! A second accept while one is in flight is answered with the same pending
//! buffer id, so a racing client converges instead of leaking regions.

use protocol::WindowId;

use crate::server::Server;
use crate::shm::window_buffer_key;
use crate::state::Stage;

impl Server {
    /// Allocate the pending buffer for an accepted offer and return its id.
    ///
    /// Idempotent: an in-flight handshake returns the existing pending id.
    pub fn begin_resize(
        &self,
        stage: &mut Stage,
        wid: WindowId,
        width: u32,
        height: u32,
    ) -> Option<u32> {
        let pending = stage.lookup(wid)?.pending_bufid;
        if pending != 0 {
            tracing::debug!(%wid, bufid = pending, "resize accept while one in flight");
            return Some(pending);
        }

        let bufid = stage.alloc_bufid();
        let key = window_buffer_key(self.ident(), wid, bufid);
        let buffer = match self.shm.obtain(&key, (width * height * 4) as usize) {
            Ok(buffer) => buffer,
            Err(error) => {
                tracing::warn!(%error, %wid, "pending buffer allocation failed");
                return None;
            }
        };

        let win = stage.lookup_mut(wid)?;
        win.pending_buffer = Some(buffer);
        win.pending_bufid = bufid;
        tracing::info!(%wid, width, height, bufid, "resize accepted");
        Some(bufid)
    }

    /// Commit an in-flight resize: swap in the pending buffer, release the
    /// old region, damage old and new bounds. A done without an accept is
    /// ignored.
    pub fn finish_resize(&self, stage: &mut Stage, wid: WindowId, width: u32, height: u32) {
        let Some(win) = stage.lookup_mut(wid) else {
            return;
        };
        if win.pending_bufid == 0 {
            return;
        }

        self.damage.mark_window(win);

        let old_bufid = win.bufid;
        win.width = width;
        win.height = height;
        win.bufid = win.pending_bufid;
        win.pending_bufid = 0;
        if let Some(pending) = win.pending_buffer.take() {
            win.buffer = pending;
        }

        self.damage.mark_window(win);
        let owner = win.owner;

        self.shm.release(&window_buffer_key(self.ident(), wid, old_bufid));
        tracing::info!(%wid, owner = %owner, width, height, released = old_bufid, "resize committed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use protocol::ClientId;

    use crate::channel::ServerChannel;
    use crate::shm::ProcessShm;

    use super::*;

    fn server() -> Server {
        Server::new("resize-test".into(), 640, 480, ServerChannel::bind(), Arc::new(ProcessShm::new()))
    }

    #[test]
    fn accept_then_done_swaps_buffers_and_releases_old() {
        let server = server();
        let mut stage = Stage::new();
        let (wid, first_bufid) = server.create_window(&mut stage, ClientId(1), 100, 50).unwrap();
        let old_key = window_buffer_key(server.ident(), wid, first_bufid);
        assert!(server.shm.contains(&old_key));

        let pending = server.begin_resize(&mut stage, wid, 200, 100).unwrap();
        assert_ne!(pending, first_bufid);
        {
            let win = stage.lookup(wid).unwrap();
            assert_eq!(win.pending_bufid, pending);
            assert_eq!(win.width, 100, "size must not change before DONE");
        }

        server.finish_resize(&mut stage, wid, 200, 100);
        let win = stage.lookup(wid).unwrap();
        assert_eq!((win.width, win.height), (200, 100));
        assert_eq!(win.bufid, pending);
        assert_eq!(win.pending_bufid, 0);
        assert!(win.pending_buffer.is_none());
        assert_eq!(win.buffer.len(), 200 * 100 * 4);
        assert!(!server.shm.contains(&old_key), "old region must be released");
    }

    #[test]
    fn second_accept_reports_the_same_pending_bufid() {
        let server = server();
        let mut stage = Stage::new();
        let (wid, _) = server.create_window(&mut stage, ClientId(1), 10, 10).unwrap();

        let first = server.begin_resize(&mut stage, wid, 20, 20).unwrap();
        let second = server.begin_resize(&mut stage, wid, 30, 30).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn done_without_accept_is_ignored() {
        let server = server();
        let mut stage = Stage::new();
        let (wid, bufid) = server.create_window(&mut stage, ClientId(1), 10, 10).unwrap();

        server.finish_resize(&mut stage, wid, 99, 99);
        let win = stage.lookup(wid).unwrap();
        assert_eq!((win.width, win.height), (10, 10));
        assert_eq!(win.bufid, bufid);
    }

    #[test]
    fn commit_damages_old_and_new_bounds() {
        let server = server();
        let mut stage = Stage::new();
        let (wid, _) = server.create_window(&mut stage, ClientId(1), 10, 10).unwrap();
        server.begin_resize(&mut stage, wid, 40, 30).unwrap();
        server.damage.drain();

        server.finish_resize(&mut stage, wid, 40, 30);
        let rects = server.damage.drain();
        assert_eq!(rects.len(), 2);
        assert_eq!((rects[0].width, rects[0].height), (10, 10));
        assert_eq!((rects[1].width, rects[1].height), (40, 30));
    }
}
