//! Input source threads
//!
//! The mouse and keyboard workers each block on a device stream and convert
//! its records into fully-formed `MOUSE_EVENT` / `KEY_EVENT` packets sent
//! back over the client channel. They never touch server state directly;
//! the dispatcher is the only mutator.
//!
//! Device record formats, little-endian:
//! - mouse, 6 bytes: `buttons u8, reserved u8, dx i16, dy i16`
//! - keyboard, 8 bytes: `action u8, modifiers u8, reserved u16, keycode u32`

use std::fs::File;
use std::io::Read;
use std::path::Path;

use protocol::{KeyAction, KeyEvent, Message, Modifiers, MouseButtons, MouseEvent, MouseSample};

use crate::channel::{ClientChannel, Connector};
use crate::config::Config;

/// Bytes per mouse device record.
pub const MOUSE_RECORD: usize = 6;

/// Bytes per keyboard device record.
pub const KEY_RECORD: usize = 8;

/// Pump mouse records into the channel until the device ends.
pub fn run_mouse_source(client: ClientChannel, mut device: impl Read) {
    let mut record = [0u8; MOUSE_RECORD];
    while device.read_exact(&mut record).is_ok() {
        let event = MouseEvent {
            sample: MouseSample::Relative,
            dx: i16::from_le_bytes([record[2], record[3]]) as i32,
            dy: i16::from_le_bytes([record[4], record[5]]) as i32,
            buttons: MouseButtons(record[0]),
        };
        client.send(&Message::MouseEvent { event });
    }
    tracing::info!("mouse source ended");
}

/// Pump keyboard records into the channel until the device ends.
pub fn run_keyboard_source(client: ClientChannel, mut device: impl Read) {
    let mut record = [0u8; KEY_RECORD];
    while device.read_exact(&mut record).is_ok() {
        let event = KeyEvent {
            action: if record[0] != 0 { KeyAction::Down } else { KeyAction::Up },
            keycode: u32::from_le_bytes([record[4], record[5], record[6], record[7]]),
            modifiers: Modifiers(record[1]),
        };
        client.send(&Message::KeyEvent { event });
    }
    tracing::info!("keyboard source ended");
}

fn open_device(path: &Path) -> Option<File> {
    match File::open(path) {
        Ok(file) => Some(file),
        Err(error) => {
            tracing::warn!(?path, %error, "input device unavailable");
            None
        }
    }
}

/// Start the two device workers. A missing device disables that worker but
/// does not stop the server.
pub fn spawn(connector: &Connector, config: &Config) {
    if let Some(device) = open_device(&config.mouse_device) {
        let client = connector.connect();
        std::thread::Builder::new()
            .name("mouse-source".into())
            .spawn(move || run_mouse_source(client, device))
            .expect("failed to spawn mouse source");
    }

    if let Some(device) = open_device(&config.keyboard_device) {
        let client = connector.connect();
        std::thread::Builder::new()
            .name("keyboard-source".into())
            .spawn(move || run_keyboard_source(client, device))
            .expect("failed to spawn keyboard source");
    }
}
