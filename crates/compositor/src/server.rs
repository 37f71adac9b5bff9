//! The server: every subsystem threaded through one struct
//!
//! [`Server`] owns the two coarse locks (the stage / registry lock and the
//! damage queue's internal lock), the client channel, the shared-memory
//! namespace, the pointer position, the animation tick, and the subscriber
//! set. The dispatcher and the render thread share it behind an `Arc`; input
//! source threads never touch it directly, they only send packets.
//!
//! Lock order where both are needed: stage first, then damage. Outbound
//! messages composed while the stage lock is held are staged in an
//! [`Outbox`] and flushed after the lock drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use protocol::{ClientId, Message, WindowId};

use crate::channel::ServerChannel;
use crate::damage::DamageQueue;
use crate::shm::{window_buffer_key, ProcessShm};
use crate::state::{registry::new_window, Stage};

/// Pointer position in 3x subpixels, shared between the dispatcher (which
/// moves it) and the renderer (which latches it once per frame).
#[derive(Debug, Clone, Copy)]
pub struct PointerState {
    pub x: i32,
    pub y: i32,
}

/// Messages staged under the stage lock, sent after it drops.
#[derive(Default)]
pub struct Outbox {
    messages: Vec<(ClientId, Message)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dest: ClientId, msg: Message) {
        self.messages.push((dest, msg));
    }
}

pub struct Server {
    ident: String,
    width: u32,
    height: u32,
    pub stage: Mutex<Stage>,
    pub damage: DamageQueue,
    pub chan: ServerChannel,
    pub shm: Arc<ProcessShm>,
    pointer: Mutex<PointerState>,
    tick: AtomicU64,
    subscribers: Mutex<Vec<ClientId>>,
}

impl Server {
    pub fn new(ident: String, width: u32, height: u32, chan: ServerChannel, shm: Arc<ProcessShm>) -> Self {
        Server {
            ident,
            width,
            height,
            stage: Mutex::new(Stage::new()),
            damage: DamageQueue::new(),
            chan,
            shm,
            pointer: Mutex::new(PointerState {
                x: width as i32 * crate::input::POINTER_SCALE / 2,
                y: height as i32 * crate::input::POINTER_SCALE / 2,
            }),
            tick: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Advance the animation clock by one frame's worth of ticks.
    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(crate::state::TICKS_PER_FRAME, Ordering::Relaxed)
            + crate::state::TICKS_PER_FRAME
    }

    pub fn pointer(&self) -> PointerState {
        *self.pointer.lock().unwrap()
    }

    pub fn pointer_mut(&self) -> MutexGuard<'_, PointerState> {
        self.pointer.lock().unwrap()
    }

    /// Add a subscriber, ignoring duplicates.
    pub fn subscribe(&self, client: ClientId) {
        let mut subs = self.subscribers.lock().unwrap();
        if !subs.contains(&client) {
            subs.push(client);
        }
    }

    pub fn unsubscribe(&self, client: ClientId) {
        self.subscribers.lock().unwrap().retain(|c| *c != client);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Tell every subscriber the window list changed.
    pub fn notify_subscribers(&self) {
        let subs = self.subscribers.lock().unwrap().clone();
        for sub in subs {
            self.chan.send(sub, &Message::Notify);
        }
    }

    /// Stage a notify for every subscriber (for paths holding the stage lock).
    pub fn queue_notify(&self, outbox: &mut Outbox) {
        for sub in self.subscribers.lock().unwrap().iter() {
            outbox.push(*sub, Message::Notify);
        }
    }

    /// Deliver everything staged while a lock was held.
    pub fn flush(&self, outbox: Outbox) {
        for (dest, msg) in outbox.messages {
            self.chan.send(dest, &msg);
        }
    }

    /// Allocate ids and a zeroed shared buffer, and place the window at the
    /// front of the MID band with its fade-in running.
    ///
    /// Returns `(wid, bufid)`, or None when the buffer cannot be obtained.
    pub fn create_window(
        &self,
        stage: &mut Stage,
        owner: ClientId,
        width: u32,
        height: u32,
    ) -> Option<(WindowId, u32)> {
        let wid = stage.alloc_wid();
        let bufid = stage.alloc_bufid();
        let key = window_buffer_key(&self.ident, wid, bufid);

        let buffer = match self.shm.obtain(&key, (width * height * 4) as usize) {
            Ok(buffer) => buffer,
            Err(error) => {
                tracing::warn!(%error, %wid, "window buffer allocation failed");
                return None;
            }
        };

        stage.insert(new_window(wid, owner, width, height, buffer, bufid, self.tick()));
        tracing::info!(%wid, owner = %owner, width, height, bufid, "window created");
        Some((wid, bufid))
    }

    /// The window key events route to: the focused window, else BOTTOM.
    pub fn focused_or_bottom(&self, stage: &Stage) -> Option<WindowId> {
        stage.focused.or(stage.bottom()).filter(|wid| stage.contains(*wid))
    }
}
