//! Boundary behaviours
//!
//! Edge cases the protocol and registry must absorb without error: id
//! exhaustion-scale creation, degenerate window sizes, and information-free
//! input events.

use std::collections::HashSet;

use compositor::shm::window_buffer_key;
use protocol::{ClientId, Message, MouseButtons, WindowId};
use test_harness::TestServer;

#[test]
fn wids_never_repeat_across_sixty_four_thousand_windows() {
    let ts = TestServer::new(64, 64);
    let mut seen: HashSet<WindowId> = HashSet::new();

    for _ in 0..(1u32 << 16) {
        let (wid, bufid) = ts.with_stage(|stage| {
            let created = ts
                .server
                .create_window(stage, ClientId(7), 0, 0)
                .expect("creation failed");
            // Tear straight back down so the arena stays small
            stage.destroy(created.0);
            created
        });
        ts.server.shm.release(&window_buffer_key("harness", wid, bufid));
        assert!(seen.insert(wid), "{wid} was reused");
    }

    assert_eq!(seen.len(), 1 << 16);
}

#[test]
fn zero_size_window_is_accepted_and_never_hit() {
    let mut ts = TestServer::new(128, 128);
    let client = ts.connect();
    client.hello(&mut ts);

    let (wid, bufid) = client.create_window(&mut ts, 0, 0);
    assert!(client.open_buffer(wid, bufid).is_empty());

    ts.with_stage(|stage| {
        assert!(stage.contains(wid));
        // The window sits at (0,0); even its own origin is not a hit
        assert_eq!(stage.hit_test(0, 0), None);
    });

    // Composition with a degenerate window in the stage is harmless
    client.send(&Message::Flip { wid });
    ts.compose();
}

#[test]
fn motionless_buttonless_mouse_event_emits_nothing() {
    let mut ts = TestServer::new(640, 480);
    let client = ts.connect();
    client.hello(&mut ts);
    client.standard_window(&mut ts, 0, 0, 640, 480);

    // Park the pointer and flush the motion chatter
    ts.mouse_at(100, 100, 0);
    client.drain();

    // Same position, no buttons: nothing may be sent
    ts.mouse_at(100, 100, 0);
    assert_eq!(client.drain(), vec![]);
}

#[test]
fn stale_wid_references_are_harmless() {
    let mut ts = TestServer::new(128, 128);
    let client = ts.connect();
    client.hello(&mut ts);

    let ghost = WindowId(999);
    for msg in [
        Message::Flip { wid: ghost },
        Message::FlipRegion { wid: ghost, x: 0, y: 0, width: 4, height: 4 },
        Message::WindowMove { wid: ghost, x: 1, y: 1 },
        Message::WindowClose { wid: ghost },
        Message::WindowFocus { wid: ghost },
        Message::ResizeAccept { wid: ghost, width: 8, height: 8 },
        Message::ResizeDone { wid: ghost, width: 8, height: 8 },
        Message::WindowUpdateShape { wid: ghost, threshold: 4 },
        Message::WindowDragStart { wid: ghost },
    ] {
        client.send(&msg);
    }
    ts.pump();

    // No replies, no effects, connection still serviced
    assert_eq!(client.drain(), vec![]);
    assert_eq!(client.hello(&mut ts), (128, 128));
}

#[test]
fn drag_release_outside_the_window_still_reports_local_coords() {
    let mut ts = TestServer::new(640, 480);
    let client = ts.connect();
    client.hello(&mut ts);
    let (wid, _) = client.standard_window(&mut ts, 200, 200, 100, 100);

    ts.mouse_at(250, 250, 0);
    client.drain();

    ts.mouse_at(250, 250, MouseButtons::LEFT);
    ts.mouse_at(150, 150, MouseButtons::LEFT);
    ts.mouse_at(150, 150, 0);

    let kinds: Vec<protocol::WindowMouseKind> = client
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            Message::WindowMouseEvent { kind, wid: w, .. } if w == wid => Some(kind),
            _ => None,
        })
        .collect();

    use protocol::WindowMouseKind::{Down, Drag, Raise};
    assert_eq!(kinds, vec![Down, Drag, Raise]);
}
