//! Wire protocol for the compositor's client channel
//!
//! Every packet exchanged between the server and its clients carries one
//! message: a 32-bit magic constant, a 32-bit type tag, then the message
//! fields in declaration order, all little-endian. Advertisements append a
//! variable-length string blob after the fixed fields; everything else is
//! fixed-size.
//!
//! The transport (a local datagram channel) handles framing and attaches the
//! source id; this crate only defines payloads. Packets whose magic does not
//! match [`MAGIC`] are dropped by the dispatcher.

use thiserror::Error;

/// Magic constant opening every payload ("STAG" in ASCII).
pub const MAGIC: u32 = 0x5354_4147;

/// Decode errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload shorter than the fields of its message type
    #[error("payload truncated: needed {needed} more bytes")]
    Truncated {
        /// How many bytes past the end the decoder tried to read
        needed: usize,
    },

    /// Magic constant mismatch
    #[error("bad magic: 0x{0:08x}")]
    BadMagic(u32),

    /// Type tag not in the message table
    #[error("unknown message type: 0x{0:08x}")]
    UnknownType(u32),

    /// A field carried a value outside its enum's range
    #[error("invalid {field}: {value}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending wire value
        value: u32,
    },
}

/// Stable window identifier, never reused within a server lifetime.
///
/// Zero is reserved: it terminates `QUERY_WINDOWS` advertisement streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client handle, the source id the transport attaches to each packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Z-band a window occupies. BOTTOM and TOP are single-slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZBand {
    Bottom,
    Mid,
    Top,
}

impl ZBand {
    fn to_wire(self) -> u32 {
        match self {
            ZBand::Bottom => 0,
            ZBand::Mid => 1,
            ZBand::Top => 2,
        }
    }

    fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(ZBand::Bottom),
            1 => Ok(ZBand::Mid),
            2 => Ok(ZBand::Top),
            _ => Err(ProtocolError::InvalidField { field: "z-band", value: v }),
        }
    }
}

/// Keyboard modifier bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const SHIFT: u8 = 0x01;
    pub const CTRL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const SUPER: u8 = 0x08;

    pub const fn empty() -> Self {
        Modifiers(0)
    }

    pub fn shift(self) -> bool {
        self.0 & Self::SHIFT != 0
    }

    pub fn ctrl(self) -> bool {
        self.0 & Self::CTRL != 0
    }

    pub fn alt(self) -> bool {
        self.0 & Self::ALT != 0
    }

    pub fn superkey(self) -> bool {
        self.0 & Self::SUPER != 0
    }
}

/// Mouse button bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseButtons(pub u8);

impl MouseButtons {
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;

    pub const fn empty() -> Self {
        MouseButtons(0)
    }

    pub fn left(self) -> bool {
        self.0 & Self::LEFT != 0
    }

    pub fn right(self) -> bool {
        self.0 & Self::RIGHT != 0
    }

    pub fn middle(self) -> bool {
        self.0 & Self::MIDDLE != 0
    }

    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask != 0
    }
}

/// Key transition direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Up,
    Down,
}

impl KeyAction {
    fn to_wire(self) -> u32 {
        match self {
            KeyAction::Up => 0,
            KeyAction::Down => 1,
        }
    }

    fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(KeyAction::Up),
            1 => Ok(KeyAction::Down),
            _ => Err(ProtocolError::InvalidField { field: "key action", value: v }),
        }
    }
}

/// A raw keyboard event as produced by an input source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub keycode: u32,
    pub modifiers: Modifiers,
}

/// How the coordinates of a raw mouse event are to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseSample {
    /// Deltas relative to the current pointer position
    Relative,
    /// Absolute position (nested hosts report these)
    Absolute,
}

impl MouseSample {
    fn to_wire(self) -> u32 {
        match self {
            MouseSample::Relative => 0,
            MouseSample::Absolute => 1,
        }
    }

    fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(MouseSample::Relative),
            1 => Ok(MouseSample::Absolute),
            _ => Err(ProtocolError::InvalidField { field: "mouse sample", value: v }),
        }
    }
}

/// A raw mouse event as produced by an input source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub sample: MouseSample,
    pub dx: i32,
    pub dy: i32,
    pub buttons: MouseButtons,
}

/// Kind of a routed, window-local mouse event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMouseKind {
    Click,
    Down,
    Raise,
    Drag,
    Move,
    Enter,
    Leave,
}

impl WindowMouseKind {
    fn to_wire(self) -> u32 {
        match self {
            WindowMouseKind::Click => 0,
            WindowMouseKind::Down => 1,
            WindowMouseKind::Raise => 2,
            WindowMouseKind::Drag => 3,
            WindowMouseKind::Move => 4,
            WindowMouseKind::Enter => 5,
            WindowMouseKind::Leave => 6,
        }
    }

    fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(WindowMouseKind::Click),
            1 => Ok(WindowMouseKind::Down),
            2 => Ok(WindowMouseKind::Raise),
            3 => Ok(WindowMouseKind::Drag),
            4 => Ok(WindowMouseKind::Move),
            5 => Ok(WindowMouseKind::Enter),
            6 => Ok(WindowMouseKind::Leave),
            _ => Err(ProtocolError::InvalidField { field: "mouse kind", value: v }),
        }
    }
}

/// What the server does with a bound key after notifying the bind owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindResponse {
    /// Also forward the event to the focused window
    PassThrough,
    /// Deliver only to the bind owner
    Steal,
}

impl BindResponse {
    fn to_wire(self) -> u32 {
        match self {
            BindResponse::PassThrough => 0,
            BindResponse::Steal => 1,
        }
    }

    fn from_wire(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(BindResponse::PassThrough),
            1 => Ok(BindResponse::Steal),
            _ => Err(ProtocolError::InvalidField { field: "bind response", value: v }),
        }
    }
}

/// Keycodes for the non-printable keys the server's built-in shortcuts use.
/// Printable keys travel as their character value.
pub mod keys {
    pub const ARROW_UP: u32 = 0x0101;
    pub const ARROW_DOWN: u32 = 0x0102;
    pub const ARROW_LEFT: u32 = 0x0103;
    pub const ARROW_RIGHT: u32 = 0x0104;
    pub const F10: u32 = 0x011a;
}

/// Opaque per-window payload shown to window-list subscribers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advertisement {
    pub flags: u32,
    pub offsets: [u16; 5],
    pub strings: Vec<u8>,
}

// Wire type tags
const T_HELLO: u32 = 0x01;
const T_WELCOME: u32 = 0x02;
const T_WINDOW_NEW: u32 = 0x03;
const T_WINDOW_INIT: u32 = 0x04;
const T_FLIP: u32 = 0x05;
const T_FLIP_REGION: u32 = 0x06;
const T_KEY_EVENT: u32 = 0x07;
const T_MOUSE_EVENT: u32 = 0x08;
const T_WINDOW_MOVE: u32 = 0x09;
const T_WINDOW_CLOSE: u32 = 0x0a;
const T_WINDOW_STACK: u32 = 0x0b;
const T_WINDOW_FOCUS: u32 = 0x0c;
const T_FOCUS_CHANGE: u32 = 0x0d;
const T_RESIZE_REQUEST: u32 = 0x0e;
const T_RESIZE_OFFER: u32 = 0x0f;
const T_RESIZE_ACCEPT: u32 = 0x10;
const T_RESIZE_BUFID: u32 = 0x11;
const T_RESIZE_DONE: u32 = 0x12;
const T_QUERY_WINDOWS: u32 = 0x13;
const T_WINDOW_ADVERTISE: u32 = 0x14;
const T_SUBSCRIBE: u32 = 0x15;
const T_UNSUBSCRIBE: u32 = 0x16;
const T_NOTIFY: u32 = 0x17;
const T_SESSION_END: u32 = 0x18;
const T_KEY_BIND: u32 = 0x19;
const T_WINDOW_DRAG_START: u32 = 0x1a;
const T_WINDOW_UPDATE_SHAPE: u32 = 0x1b;
const T_WINDOW_KEY_EVENT: u32 = 0x1c;
const T_WINDOW_MOUSE_EVENT: u32 = 0x1d;

/// One message on the client channel.
///
/// The same namespace covers both directions; the dispatcher ignores
/// server-to-client types arriving from clients (they fall through the
/// unknown-type arm of its match).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client greeting
    Hello,
    /// Server reply to `Hello` with the screen size
    Welcome { width: u32, height: u32 },
    /// Request a new window of the given size
    WindowNew { width: u32, height: u32 },
    /// Server reply carrying the new window's id and buffer name
    WindowInit { wid: WindowId, width: u32, height: u32, bufid: u32 },
    /// The client finished drawing; repaint the whole window
    Flip { wid: WindowId },
    /// Repaint one window-local rectangle
    FlipRegion { wid: WindowId, x: i32, y: i32, width: i32, height: i32 },
    /// Raw keyboard event from an input source
    KeyEvent { event: KeyEvent },
    /// Raw mouse event from an input source
    MouseEvent { event: MouseEvent },
    /// Move a window to an absolute position
    WindowMove { wid: WindowId, x: i32, y: i32 },
    /// Begin the fade-out close of a window
    WindowClose { wid: WindowId },
    /// Move a window to another z-band
    WindowStack { wid: WindowId, z: ZBand },
    /// Give a window the input focus
    WindowFocus { wid: WindowId },
    /// Focus gained (1) or lost (0) notification to a window's owner
    FocusChange { wid: WindowId, focused: u32 },
    /// Ask the server to offer this window a new size
    ResizeRequest { wid: WindowId, width: u32, height: u32 },
    /// Size offer (server to owner; clients may also echo offers)
    ResizeOffer { wid: WindowId, width: u32, height: u32, bufid: u32 },
    /// Client accepts an offer and wants a new buffer
    ResizeAccept { wid: WindowId, width: u32, height: u32 },
    /// Server reply naming the pending buffer
    ResizeBufid { wid: WindowId, width: u32, height: u32, bufid: u32 },
    /// Client painted the pending buffer; commit the resize
    ResizeDone { wid: WindowId, width: u32, height: u32 },
    /// Stream one advertisement per window, then a wid=0 terminator
    QueryWindows,
    /// Window metadata, client-supplied or streamed back by the server
    WindowAdvertise { wid: WindowId, ad: Advertisement },
    /// Start receiving `Notify` on window-list changes
    Subscribe,
    /// Stop receiving `Notify`
    Unsubscribe,
    /// Something in the window list changed; re-query to reconcile
    Notify,
    /// End the session; the server broadcasts this to every client
    SessionEnd,
    /// Install a global key binding owned by the sender
    KeyBind { modifiers: Modifiers, keycode: u32, response: BindResponse },
    /// Begin a pointer-driven move of the window
    WindowDragStart { wid: WindowId },
    /// Set the alpha threshold used for hit-testing
    WindowUpdateShape { wid: WindowId, threshold: u8 },
    /// Keyboard event routed to a window (or to a bind owner)
    WindowKeyEvent { wid: WindowId, event: KeyEvent },
    /// Window-local mouse event routed to a window's owner
    WindowMouseEvent {
        wid: WindowId,
        x: i32,
        y: i32,
        old_x: i32,
        old_y: i32,
        buttons: MouseButtons,
        kind: WindowMouseKind,
    },
}

impl Message {
    /// Serialize into a channel payload (magic, type tag, fields).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(MAGIC);
        match self {
            Message::Hello => w.u32(T_HELLO),
            Message::Welcome { width, height } => {
                w.u32(T_WELCOME);
                w.u32(*width);
                w.u32(*height);
            }
            Message::WindowNew { width, height } => {
                w.u32(T_WINDOW_NEW);
                w.u32(*width);
                w.u32(*height);
            }
            Message::WindowInit { wid, width, height, bufid } => {
                w.u32(T_WINDOW_INIT);
                w.u32(wid.0);
                w.u32(*width);
                w.u32(*height);
                w.u32(*bufid);
            }
            Message::Flip { wid } => {
                w.u32(T_FLIP);
                w.u32(wid.0);
            }
            Message::FlipRegion { wid, x, y, width, height } => {
                w.u32(T_FLIP_REGION);
                w.u32(wid.0);
                w.i32(*x);
                w.i32(*y);
                w.i32(*width);
                w.i32(*height);
            }
            Message::KeyEvent { event } => {
                w.u32(T_KEY_EVENT);
                w.key_event(event);
            }
            Message::MouseEvent { event } => {
                w.u32(T_MOUSE_EVENT);
                w.u32(event.sample.to_wire());
                w.i32(event.dx);
                w.i32(event.dy);
                w.u32(event.buttons.0 as u32);
            }
            Message::WindowMove { wid, x, y } => {
                w.u32(T_WINDOW_MOVE);
                w.u32(wid.0);
                w.i32(*x);
                w.i32(*y);
            }
            Message::WindowClose { wid } => {
                w.u32(T_WINDOW_CLOSE);
                w.u32(wid.0);
            }
            Message::WindowStack { wid, z } => {
                w.u32(T_WINDOW_STACK);
                w.u32(wid.0);
                w.u32(z.to_wire());
            }
            Message::WindowFocus { wid } => {
                w.u32(T_WINDOW_FOCUS);
                w.u32(wid.0);
            }
            Message::FocusChange { wid, focused } => {
                w.u32(T_FOCUS_CHANGE);
                w.u32(wid.0);
                w.u32(*focused);
            }
            Message::ResizeRequest { wid, width, height } => {
                w.u32(T_RESIZE_REQUEST);
                w.resize(wid, *width, *height, 0);
            }
            Message::ResizeOffer { wid, width, height, bufid } => {
                w.u32(T_RESIZE_OFFER);
                w.resize(wid, *width, *height, *bufid);
            }
            Message::ResizeAccept { wid, width, height } => {
                w.u32(T_RESIZE_ACCEPT);
                w.resize(wid, *width, *height, 0);
            }
            Message::ResizeBufid { wid, width, height, bufid } => {
                w.u32(T_RESIZE_BUFID);
                w.resize(wid, *width, *height, *bufid);
            }
            Message::ResizeDone { wid, width, height } => {
                w.u32(T_RESIZE_DONE);
                w.resize(wid, *width, *height, 0);
            }
            Message::QueryWindows => w.u32(T_QUERY_WINDOWS),
            Message::WindowAdvertise { wid, ad } => {
                w.u32(T_WINDOW_ADVERTISE);
                w.u32(wid.0);
                w.u32(ad.flags);
                for off in ad.offsets {
                    w.u16(off);
                }
                w.u32(ad.strings.len() as u32);
                w.bytes(&ad.strings);
            }
            Message::Subscribe => w.u32(T_SUBSCRIBE),
            Message::Unsubscribe => w.u32(T_UNSUBSCRIBE),
            Message::Notify => w.u32(T_NOTIFY),
            Message::SessionEnd => w.u32(T_SESSION_END),
            Message::KeyBind { modifiers, keycode, response } => {
                w.u32(T_KEY_BIND);
                w.u32(modifiers.0 as u32);
                w.u32(*keycode);
                w.u32(response.to_wire());
            }
            Message::WindowDragStart { wid } => {
                w.u32(T_WINDOW_DRAG_START);
                w.u32(wid.0);
            }
            Message::WindowUpdateShape { wid, threshold } => {
                w.u32(T_WINDOW_UPDATE_SHAPE);
                w.u32(wid.0);
                w.u32(*threshold as u32);
            }
            Message::WindowKeyEvent { wid, event } => {
                w.u32(T_WINDOW_KEY_EVENT);
                w.u32(wid.0);
                w.key_event(event);
            }
            Message::WindowMouseEvent { wid, x, y, old_x, old_y, buttons, kind } => {
                w.u32(T_WINDOW_MOUSE_EVENT);
                w.u32(wid.0);
                w.i32(*x);
                w.i32(*y);
                w.i32(*old_x);
                w.i32(*old_y);
                w.u32(buttons.0 as u32);
                w.u32(kind.to_wire());
            }
        }
        w.finish()
    }

    /// Parse a channel payload.
    pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
        let mut r = Reader::new(payload);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        let tag = r.u32()?;
        let msg = match tag {
            T_HELLO => Message::Hello,
            T_WELCOME => Message::Welcome { width: r.u32()?, height: r.u32()? },
            T_WINDOW_NEW => Message::WindowNew { width: r.u32()?, height: r.u32()? },
            T_WINDOW_INIT => Message::WindowInit {
                wid: WindowId(r.u32()?),
                width: r.u32()?,
                height: r.u32()?,
                bufid: r.u32()?,
            },
            T_FLIP => Message::Flip { wid: WindowId(r.u32()?) },
            T_FLIP_REGION => Message::FlipRegion {
                wid: WindowId(r.u32()?),
                x: r.i32()?,
                y: r.i32()?,
                width: r.i32()?,
                height: r.i32()?,
            },
            T_KEY_EVENT => Message::KeyEvent { event: r.key_event()? },
            T_MOUSE_EVENT => Message::MouseEvent {
                event: MouseEvent {
                    sample: MouseSample::from_wire(r.u32()?)?,
                    dx: r.i32()?,
                    dy: r.i32()?,
                    buttons: MouseButtons(r.u32()? as u8),
                },
            },
            T_WINDOW_MOVE => Message::WindowMove {
                wid: WindowId(r.u32()?),
                x: r.i32()?,
                y: r.i32()?,
            },
            T_WINDOW_CLOSE => Message::WindowClose { wid: WindowId(r.u32()?) },
            T_WINDOW_STACK => Message::WindowStack {
                wid: WindowId(r.u32()?),
                z: ZBand::from_wire(r.u32()?)?,
            },
            T_WINDOW_FOCUS => Message::WindowFocus { wid: WindowId(r.u32()?) },
            T_FOCUS_CHANGE => Message::FocusChange { wid: WindowId(r.u32()?), focused: r.u32()? },
            T_RESIZE_REQUEST => {
                let (wid, width, height, _) = r.resize()?;
                Message::ResizeRequest { wid, width, height }
            }
            T_RESIZE_OFFER => {
                let (wid, width, height, bufid) = r.resize()?;
                Message::ResizeOffer { wid, width, height, bufid }
            }
            T_RESIZE_ACCEPT => {
                let (wid, width, height, _) = r.resize()?;
                Message::ResizeAccept { wid, width, height }
            }
            T_RESIZE_BUFID => {
                let (wid, width, height, bufid) = r.resize()?;
                Message::ResizeBufid { wid, width, height, bufid }
            }
            T_RESIZE_DONE => {
                let (wid, width, height, _) = r.resize()?;
                Message::ResizeDone { wid, width, height }
            }
            T_QUERY_WINDOWS => Message::QueryWindows,
            T_WINDOW_ADVERTISE => {
                let wid = WindowId(r.u32()?);
                let flags = r.u32()?;
                let mut offsets = [0u16; 5];
                for off in &mut offsets {
                    *off = r.u16()?;
                }
                let len = r.u32()? as usize;
                let strings = r.bytes(len)?.to_vec();
                Message::WindowAdvertise { wid, ad: Advertisement { flags, offsets, strings } }
            }
            T_SUBSCRIBE => Message::Subscribe,
            T_UNSUBSCRIBE => Message::Unsubscribe,
            T_NOTIFY => Message::Notify,
            T_SESSION_END => Message::SessionEnd,
            T_KEY_BIND => Message::KeyBind {
                modifiers: Modifiers(r.u32()? as u8),
                keycode: r.u32()?,
                response: BindResponse::from_wire(r.u32()?)?,
            },
            T_WINDOW_DRAG_START => Message::WindowDragStart { wid: WindowId(r.u32()?) },
            T_WINDOW_UPDATE_SHAPE => Message::WindowUpdateShape {
                wid: WindowId(r.u32()?),
                threshold: r.u32()? as u8,
            },
            T_WINDOW_KEY_EVENT => Message::WindowKeyEvent {
                wid: WindowId(r.u32()?),
                event: r.key_event()?,
            },
            T_WINDOW_MOUSE_EVENT => Message::WindowMouseEvent {
                wid: WindowId(r.u32()?),
                x: r.i32()?,
                y: r.i32()?,
                old_x: r.i32()?,
                old_y: r.i32()?,
                buttons: MouseButtons(r.u32()? as u8),
                kind: WindowMouseKind::from_wire(r.u32()?)?,
            },
            other => return Err(ProtocolError::UnknownType(other)),
        };
        Ok(msg)
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::with_capacity(64) }
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn key_event(&mut self, ev: &KeyEvent) {
        self.u32(ev.action.to_wire());
        self.u32(ev.keycode);
        self.u32(ev.modifiers.0 as u32);
    }

    fn resize(&mut self, wid: &WindowId, width: u32, height: u32, bufid: u32) {
        self.u32(wid.0);
        self.u32(width);
        self.u32(height);
        self.u32(bufid);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.data.len() {
            return Err(ProtocolError::Truncated { needed: self.pos + n - self.data.len() });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n)
    }

    fn key_event(&mut self) -> Result<KeyEvent, ProtocolError> {
        Ok(KeyEvent {
            action: KeyAction::from_wire(self.u32()?)?,
            keycode: self.u32()?,
            modifiers: Modifiers(self.u32()? as u8),
        })
    }

    fn resize(&mut self) -> Result<(WindowId, u32, u32, u32), ProtocolError> {
        Ok((WindowId(self.u32()?), self.u32()?, self.u32()?, self.u32()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let bytes = msg.encode();
        let back = Message::decode(&bytes).expect("decode failed");
        assert_eq!(msg, back);
    }

    #[test]
    fn fixed_messages_roundtrip() {
        roundtrip(Message::Hello);
        roundtrip(Message::Welcome { width: 1280, height: 720 });
        roundtrip(Message::WindowNew { width: 100, height: 50 });
        roundtrip(Message::WindowInit {
            wid: WindowId(1),
            width: 100,
            height: 50,
            bufid: 1,
        });
        roundtrip(Message::Flip { wid: WindowId(7) });
        roundtrip(Message::FlipRegion {
            wid: WindowId(7),
            x: -3,
            y: 4,
            width: 10,
            height: 12,
        });
        roundtrip(Message::WindowMove { wid: WindowId(2), x: -20, y: 35 });
        roundtrip(Message::WindowStack { wid: WindowId(2), z: ZBand::Top });
        roundtrip(Message::FocusChange { wid: WindowId(2), focused: 1 });
        roundtrip(Message::SessionEnd);
    }

    #[test]
    fn input_events_roundtrip() {
        roundtrip(Message::KeyEvent {
            event: KeyEvent {
                action: KeyAction::Down,
                keycode: 'z' as u32,
                modifiers: Modifiers(Modifiers::CTRL | Modifiers::SHIFT),
            },
        });
        roundtrip(Message::MouseEvent {
            event: MouseEvent {
                sample: MouseSample::Relative,
                dx: -5,
                dy: 12,
                buttons: MouseButtons(MouseButtons::LEFT),
            },
        });
        roundtrip(Message::WindowMouseEvent {
            wid: WindowId(3),
            x: 40,
            y: 20,
            old_x: -1,
            old_y: -1,
            buttons: MouseButtons::empty(),
            kind: WindowMouseKind::Click,
        });
        roundtrip(Message::WindowKeyEvent {
            wid: WindowId(3),
            event: KeyEvent {
                action: KeyAction::Up,
                keycode: 0x41,
                modifiers: Modifiers::empty(),
            },
        });
    }

    #[test]
    fn resize_handshake_roundtrip() {
        roundtrip(Message::ResizeRequest { wid: WindowId(4), width: 200, height: 100 });
        roundtrip(Message::ResizeOffer { wid: WindowId(4), width: 200, height: 100, bufid: 0 });
        roundtrip(Message::ResizeAccept { wid: WindowId(4), width: 200, height: 100 });
        roundtrip(Message::ResizeBufid { wid: WindowId(4), width: 200, height: 100, bufid: 2 });
        roundtrip(Message::ResizeDone { wid: WindowId(4), width: 200, height: 100 });
    }

    #[test]
    fn advertisement_roundtrip() {
        roundtrip(Message::WindowAdvertise {
            wid: WindowId(9),
            ad: Advertisement {
                flags: 0x10,
                offsets: [0, 5, 11, 11, 11],
                strings: b"hello\0world\0".to_vec(),
            },
        });
        // Terminator form: wid 0, empty payload
        roundtrip(Message::WindowAdvertise { wid: WindowId(0), ad: Advertisement::default() });
    }

    #[test]
    fn key_bind_roundtrip() {
        roundtrip(Message::KeyBind {
            modifiers: Modifiers(Modifiers::CTRL | Modifiers::ALT),
            keycode: 't' as u32,
            response: BindResponse::Steal,
        });
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Message::Hello.encode();
        bytes[0] ^= 0xff;
        assert!(matches!(Message::decode(&bytes), Err(ProtocolError::BadMagic(_))));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut w = Vec::new();
        w.extend_from_slice(&MAGIC.to_le_bytes());
        w.extend_from_slice(&0xdead_u32.to_le_bytes());
        assert_eq!(Message::decode(&w), Err(ProtocolError::UnknownType(0xdead)));
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = Message::Welcome { width: 1, height: 2 }.encode();
        for cut in 0..bytes.len() {
            let result = Message::decode(&bytes[..cut]);
            assert!(result.is_err(), "decode succeeded on {cut}-byte prefix");
        }
    }

    #[test]
    fn advertisement_length_is_validated() {
        // Claim a longer strings blob than the payload carries
        let msg = Message::WindowAdvertise {
            wid: WindowId(1),
            ad: Advertisement { flags: 0, offsets: [0; 5], strings: b"abc".to_vec() },
        };
        let mut bytes = msg.encode();
        let len_at = bytes.len() - 3 - 4;
        bytes[len_at..len_at + 4].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            Message::decode(&bytes),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn modifier_and_button_masks() {
        let mods = Modifiers(Modifiers::CTRL | Modifiers::SHIFT);
        assert!(mods.ctrl() && mods.shift());
        assert!(!mods.alt() && !mods.superkey());

        let buttons = MouseButtons(MouseButtons::LEFT | MouseButtons::MIDDLE);
        assert!(buttons.left() && buttons.middle());
        assert!(!buttons.right());
        assert!(buttons.contains(MouseButtons::MIDDLE));
    }
}
