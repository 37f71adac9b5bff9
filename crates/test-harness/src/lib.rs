//! In-process server fixtures
//!
//! [`TestServer`] boots a complete server against the software backend and
//! the loopback channel, then steps it deterministically: [`pump`] drains
//! the packet queue through the dispatcher, [`compose`] renders exactly one
//! frame. [`TestClient`] is a protocol-speaking client with helpers for the
//! common handshakes.
//!
//! [`pump`]: TestServer::pump
//! [`compose`]: TestServer::compose

use std::sync::Arc;

use compositor::backend::{Backend, SoftwareBackend, SoftwareCanvas};
use compositor::channel::{ClientChannel, ServerChannel};
use compositor::input::{InputState, MouseState};
use compositor::server::Server;
use compositor::shm::{window_buffer_key, ProcessShm, SharedBuffer};
use compositor::state::{Stage, ANIM_LENGTH, TICKS_PER_FRAME};

use protocol::{
    ClientId, KeyAction, KeyEvent, Message, Modifiers, MouseButtons, MouseEvent, MouseSample,
    WindowId,
};

/// A whole server, stepped by hand.
pub struct TestServer {
    pub server: Arc<Server>,
    backend: SoftwareBackend,
    input: InputState,
    input_source: ClientChannel,
    last_pointer: (i32, i32),
}

impl TestServer {
    pub fn new(width: u32, height: u32) -> Self {
        let chan = ServerChannel::bind();
        let shm = Arc::new(ProcessShm::new());
        let server = Arc::new(Server::new("harness".to_string(), width, height, chan, shm));
        let input_source = server.chan.connector().connect();
        TestServer {
            server,
            backend: SoftwareBackend::new(width, height),
            input: InputState::new(),
            input_source,
            last_pointer: (-1, -1),
        }
    }

    /// Open a new client connection.
    pub fn connect(&self) -> TestClient {
        TestClient {
            chan: self.server.chan.connector().connect(),
            shm: Arc::clone(&self.server.shm),
            ident: self.server.ident().to_string(),
        }
    }

    /// Run the dispatcher over every queued packet.
    pub fn pump(&mut self) {
        while let Some(packet) = self.server.chan.try_listen() {
            self.server.handle_packet(&mut self.input, packet);
        }
    }

    /// Pump, then compose one frame.
    pub fn compose(&mut self) {
        self.pump();
        self.server.compose(&mut self.backend, None, &mut self.last_pointer);
    }

    pub fn compose_frames(&mut self, frames: u64) {
        for _ in 0..frames {
            self.compose();
        }
    }

    /// Enough frames for a fade to start and finish.
    pub fn run_fade(&mut self) {
        self.compose_frames(ANIM_LENGTH / TICKS_PER_FRAME + 2);
    }

    /// The presented surface.
    pub fn screen(&self) -> &SoftwareCanvas {
        self.backend.front()
    }

    /// Read (or mutate) the registry under its lock.
    pub fn with_stage<R>(&self, f: impl FnOnce(&mut Stage) -> R) -> R {
        let mut stage = self.server.stage.lock().unwrap();
        f(&mut stage)
    }

    pub fn mouse_state(&self) -> MouseState {
        self.input.mouse_state
    }

    /// Pointer position in screen pixels.
    pub fn pointer(&self) -> (i32, i32) {
        let p = self.server.pointer();
        (p.x / compositor::input::POINTER_SCALE, p.y / compositor::input::POINTER_SCALE)
    }

    // Input injection, routed through the channel like a real device worker.

    pub fn key(&mut self, action: KeyAction, keycode: u32, modifiers: Modifiers) {
        self.input_source.send(&Message::KeyEvent {
            event: KeyEvent { action, keycode, modifiers },
        });
        self.pump();
    }

    pub fn key_down(&mut self, keycode: u32, modifiers: Modifiers) {
        self.key(KeyAction::Down, keycode, modifiers);
    }

    pub fn key_up(&mut self, keycode: u32, modifiers: Modifiers) {
        self.key(KeyAction::Up, keycode, modifiers);
    }

    /// Absolute pointer placement in screen pixels with the given buttons.
    pub fn mouse_at(&mut self, x: i32, y: i32, buttons: u8) {
        self.input_source.send(&Message::MouseEvent {
            event: MouseEvent {
                sample: MouseSample::Absolute,
                dx: x,
                dy: y,
                buttons: MouseButtons(buttons),
            },
        });
        self.pump();
    }

    /// Relative pointer motion in screen pixels.
    pub fn mouse_move(&mut self, dx: i32, dy: i32, buttons: u8) {
        self.input_source.send(&Message::MouseEvent {
            event: MouseEvent {
                sample: MouseSample::Relative,
                dx,
                // Device deltas are y-up; the server flips them
                dy: -dy,
                buttons: MouseButtons(buttons),
            },
        });
        self.pump();
    }
}

/// A protocol-speaking client endpoint.
pub struct TestClient {
    chan: ClientChannel,
    shm: Arc<ProcessShm>,
    ident: String,
}

impl TestClient {
    pub fn id(&self) -> ClientId {
        self.chan.id()
    }

    pub fn send(&self, msg: &Message) {
        self.chan.send(msg);
    }

    /// Next pending server message, if any.
    pub fn recv(&self) -> Option<Message> {
        self.chan
            .try_recv()
            .map(|payload| Message::decode(&payload).expect("server sent undecodable message"))
    }

    /// All pending server messages.
    pub fn drain(&self) -> Vec<Message> {
        std::iter::from_fn(|| self.recv()).collect()
    }

    /// `HELLO` → `WELCOME` handshake; returns the advertised screen size.
    pub fn hello(&self, server: &mut TestServer) -> (u32, u32) {
        self.send(&Message::Hello);
        server.pump();
        match self.recv() {
            Some(Message::Welcome { width, height }) => (width, height),
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    /// `WINDOW_NEW` → `WINDOW_INIT`; returns `(wid, bufid)`.
    pub fn create_window(&self, server: &mut TestServer, width: u32, height: u32) -> (WindowId, u32) {
        self.send(&Message::WindowNew { width, height });
        server.pump();
        match self.recv() {
            Some(Message::WindowInit { wid, bufid, .. }) => (wid, bufid),
            other => panic!("expected WindowInit, got {other:?}"),
        }
    }

    /// Map a window buffer the way a real client would, by its shm key.
    pub fn open_buffer(&self, wid: WindowId, bufid: u32) -> SharedBuffer {
        self.shm
            .open(&window_buffer_key(&self.ident, wid, bufid))
            .expect("window buffer not published")
    }

    /// Fill a window buffer with one opaque colour.
    pub fn fill_opaque(&self, wid: WindowId, bufid: u32, argb: u32) {
        self.open_buffer(wid, bufid).with_mut(|bytes| {
            for px in bytes.chunks_exact_mut(4) {
                px.copy_from_slice(&argb.to_le_bytes());
            }
        });
    }

    /// Create, paint opaque, position, and focus a window; drains the
    /// resulting chatter. Returns `(wid, bufid)`.
    pub fn standard_window(
        &self,
        server: &mut TestServer,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> (WindowId, u32) {
        let (wid, bufid) = self.create_window(server, width, height);
        self.fill_opaque(wid, bufid, 0xFFC0_C0C0);
        self.send(&Message::WindowMove { wid, x, y });
        self.send(&Message::WindowFocus { wid });
        server.pump();
        self.drain();
        (wid, bufid)
    }
}
