//! Focus management
//!
//! At most one window holds the focus. Changing it notifies the old owner
//! before the new one, raises the newly focused window within MID, and tells
//! subscribers. When nothing holds focus, key routing falls through to the
//! BOTTOM window ([`Server::focused_or_bottom`]).

use protocol::{Message, WindowId};

use crate::server::{Outbox, Server};
use crate::state::Stage;

impl Server {
    /// Change the focused window.
    ///
    /// No-op when the focus is unchanged. Focus-lost is staged strictly
    /// before focus-gained.
    pub fn set_focus(&self, stage: &mut Stage, wid: Option<WindowId>, outbox: &mut Outbox) {
        let wid = wid.filter(|w| stage.contains(*w));
        if stage.focused == wid {
            return;
        }

        if let Some(old) = stage.focused {
            if let Some(win) = stage.lookup(old) {
                outbox.push(win.owner, Message::FocusChange { wid: old, focused: 0 });
            }
        }

        stage.focused = wid;

        if let Some(new) = wid {
            if let Some(win) = stage.lookup(new) {
                outbox.push(win.owner, Message::FocusChange { wid: new, focused: 1 });
            }
            stage.raise(new);
            tracing::debug!(wid = %new, "focus changed");
        } else {
            tracing::debug!("focus cleared");
        }

        self.queue_notify(outbox);
    }

    /// Focus whatever window is under a screen coordinate (or clear focus
    /// when the pointer is over nothing).
    pub fn focus_at(&self, stage: &mut Stage, x: i32, y: i32, outbox: &mut Outbox) {
        let hit = stage.hit_test(x, y);
        self.set_focus(stage, hit, outbox);
    }

    /// Explicit fallback after the focused window is destroyed: focus the
    /// BOTTOM window and emit the corresponding focus-change messages.
    pub fn focus_fallback(&self, stage: &mut Stage, outbox: &mut Outbox) {
        let bottom = stage.bottom();
        self.set_focus(stage, bottom, outbox);
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
        Server::new("focus-test".into(), 640, 480, ServerChannel::bind(), Arc::new(ProcessShm::new()))
    }

    #[test]
    fn focus_raises_and_is_idempotent() {
        let server = server();
        let mut stage = Stage::new();
        let a = server.create_window(&mut stage, ClientId(1), 8, 8).unwrap().0;
        let b = server.create_window(&mut stage, ClientId(1), 8, 8).unwrap().0;

        let mut outbox = Outbox::new();
        server.set_focus(&mut stage, Some(a), &mut outbox);
        assert_eq!(stage.focused, Some(a));
        assert_eq!(stage.mid().last(), Some(&a));

        // Re-focusing the same window stages nothing new
        let mut second = Outbox::new();
        server.set_focus(&mut stage, Some(a), &mut second);
        assert_eq!(stage.focused, Some(a));

        server.set_focus(&mut stage, Some(b), &mut Outbox::new());
        assert_eq!(stage.mid().last(), Some(&b));
    }

    #[test]
    fn stale_focus_id_is_rejected() {
        let server = server();
        let mut stage = Stage::new();
        let a = server.create_window(&mut stage, ClientId(1), 8, 8).unwrap().0;
        stage.destroy(a);

        server.set_focus(&mut stage, Some(a), &mut Outbox::new());
        assert_eq!(stage.focused, None);
    }

    #[test]
    fn fallback_moves_focus_to_bottom() {
        let server = server();
        let mut stage = Stage::new();
        let a = server.create_window(&mut stage, ClientId(1), 8, 8).unwrap().0;
        let b = server.create_window(&mut stage, ClientId(1), 8, 8).unwrap().0;
        stage.reorder(a, protocol::ZBand::Bottom);

        server.set_focus(&mut stage, Some(b), &mut Outbox::new());
        stage.destroy(b);
        assert_eq!(stage.focused, None);

        server.focus_fallback(&mut stage, &mut Outbox::new());
        assert_eq!(stage.focused, Some(a));
    }
}
