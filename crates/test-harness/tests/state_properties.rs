//! Property-based tests for registry and interaction invariants
//!
//! Arbitrary operation sequences are replayed through the real dispatcher;
//! after every step the registry must still satisfy its structural
//! invariants.

use std::collections::HashSet;

use proptest::prelude::*;

use compositor::geometry::Placement;
use protocol::{Message, WindowId, ZBand};
use test_harness::TestServer;

/// One protocol-level operation against a window picked by index.
#[derive(Debug, Clone)]
enum Op {
    Create { width: u32, height: u32 },
    Stack { index: usize, z: ZBand },
    Focus { index: usize },
    Close { index: usize },
    Accept { index: usize },
    Done { index: usize },
    Frame,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..64, 1u32..64).prop_map(|(width, height)| Op::Create { width, height }),
        (any::<usize>(), prop_oneof![Just(ZBand::Bottom), Just(ZBand::Mid), Just(ZBand::Top)])
            .prop_map(|(index, z)| Op::Stack { index, z }),
        any::<usize>().prop_map(|index| Op::Focus { index }),
        any::<usize>().prop_map(|index| Op::Close { index }),
        any::<usize>().prop_map(|index| Op::Accept { index }),
        any::<usize>().prop_map(|index| Op::Done { index }),
        Just(Op::Frame),
    ]
}

/// Structural invariants that must hold in every reachable state.
fn check_invariants(ts: &TestServer) {
    ts.with_stage(|stage| {
        // Single-slot bands, and no window in more than one band
        let mut seen: HashSet<WindowId> = HashSet::new();
        for wid in stage.blit_order() {
            assert!(seen.insert(wid), "{wid} appears in more than one band slot");
        }
        assert_eq!(seen.len(), stage.window_count(), "band membership must partition the arena");

        // Band field agrees with the slot the window sits in
        if let Some(wid) = stage.bottom() {
            assert_eq!(stage.lookup(wid).unwrap().z, ZBand::Bottom);
        }
        if let Some(wid) = stage.top() {
            assert_eq!(stage.lookup(wid).unwrap().z, ZBand::Top);
        }
        for wid in stage.mid() {
            assert_eq!(stage.lookup(*wid).unwrap().z, ZBand::Mid);
        }

        // lookup(wid) round-trips
        for wid in stage.blit_order() {
            assert_eq!(stage.lookup(wid).unwrap().wid, wid);
        }

        // Buckets are non-empty and owner-consistent
        for (client, wids) in stage.buckets() {
            assert!(!wids.is_empty(), "empty bucket for {client}");
            for wid in wids {
                assert_eq!(stage.lookup(wid).unwrap().owner, client);
            }
        }

        // A pending resize always names a second, distinct buffer
        for wid in stage.blit_order() {
            let win = stage.lookup(wid).unwrap();
            if win.pending_bufid != 0 {
                assert_ne!(win.pending_bufid, win.bufid);
                assert!(win.pending_buffer.is_some());
            }
        }

        // Focus and hover ids are valid or absent
        for pointer in [stage.focused, stage.hover] {
            if let Some(wid) = pointer {
                assert!(stage.contains(wid), "stale pointer at {wid}");
            }
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registry_invariants_hold_under_arbitrary_ops(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut ts = TestServer::new(640, 480);
        let client = ts.connect();
        client.hello(&mut ts);

        let mut wids: Vec<WindowId> = Vec::new();
        for op in ops {
            match op {
                Op::Create { width, height } => {
                    if wids.len() < 8 {
                        let (wid, _) = client.create_window(&mut ts, width, height);
                        wids.push(wid);
                    }
                }
                Op::Stack { index, z } if !wids.is_empty() => {
                    let wid = wids[index % wids.len()];
                    client.send(&Message::WindowStack { wid, z });
                }
                Op::Focus { index } if !wids.is_empty() => {
                    let wid = wids[index % wids.len()];
                    client.send(&Message::WindowFocus { wid });
                }
                Op::Close { index } if !wids.is_empty() => {
                    let wid = wids[index % wids.len()];
                    client.send(&Message::WindowClose { wid });
                }
                Op::Accept { index } if !wids.is_empty() => {
                    let wid = wids[index % wids.len()];
                    client.send(&Message::ResizeAccept { wid, width: 32, height: 32 });
                }
                Op::Done { index } if !wids.is_empty() => {
                    let wid = wids[index % wids.len()];
                    client.send(&Message::ResizeDone { wid, width: 32, height: 32 });
                }
                Op::Frame => ts.compose(),
                _ => {}
            }
            ts.pump();
            client.drain();
            check_invariants(&ts);
        }

        // Let every pending fade finish; invariants must survive destruction
        ts.run_fade();
        check_invariants(&ts);
    }

    #[test]
    fn rotation_roundtrip_is_within_one_pixel(
        x in -100i32..100,
        y in -100i32..100,
        width in 1i32..256,
        height in 1i32..256,
        rotation in 0i32..360,
        fx in 0.0f64..1.0,
        fy in 0.0f64..1.0,
    ) {
        let placement = Placement { x, y, width, height, rotation };
        let lx = (fx * width as f64) as i32;
        let ly = (fy * height as f64) as i32;

        let (dx, dy) = placement.to_device(lx, ly);
        let (bx, by) = placement.to_local(dx, dy);

        prop_assert!((bx - lx).abs() <= 1, "x drifted: {lx} -> {bx}");
        prop_assert!((by - ly).abs() <= 1, "y drifted: {ly} -> {by}");
    }
}

#[test]
fn bottom_then_mid_restores_membership_with_eviction() {
    let mut ts = TestServer::new(640, 480);
    let client = ts.connect();
    client.hello(&mut ts);

    let (first, _) = client.create_window(&mut ts, 16, 16);
    let (second, _) = client.create_window(&mut ts, 16, 16);

    client.send(&Message::WindowStack { wid: first, z: ZBand::Bottom });
    client.send(&Message::WindowStack { wid: second, z: ZBand::Bottom });
    ts.pump();

    // `second` evicted `first` back into MID
    ts.with_stage(|stage| {
        assert_eq!(stage.bottom(), Some(second));
        assert!(stage.mid().contains(&first));
    });

    client.send(&Message::WindowStack { wid: second, z: ZBand::Mid });
    ts.pump();

    ts.with_stage(|stage| {
        assert_eq!(stage.bottom(), None);
        assert!(stage.mid().contains(&first));
        assert!(stage.mid().contains(&second));
    });
}

#[test]
fn maximal_tile_fills_the_screen_below_the_panel() {
    let mut ts = TestServer::new(1280, 720);
    let client = ts.connect();
    client.hello(&mut ts);

    let (panel, _) = client.create_window(&mut ts, 1280, 24);
    client.send(&Message::WindowStack { wid: panel, z: ZBand::Top });
    ts.pump();

    let (wid, _) = client.standard_window(&mut ts, 50, 50, 100, 100);
    client.drain();

    ts.key_down(protocol::keys::F10, protocol::Modifiers(protocol::Modifiers::ALT));

    let (width, height) = client
        .drain()
        .into_iter()
        .find_map(|msg| match msg {
            Message::ResizeOffer { wid: w, width, height, .. } if w == wid => {
                Some((width, height))
            }
            _ => None,
        })
        .expect("no offer after ALT+F10");
    assert_eq!((width, height), (1280, 696));

    // Accept the offer the way a client would; the final geometry is the
    // full screen minus the panel band
    client.send(&Message::ResizeAccept { wid, width, height });
    ts.pump();
    client.send(&Message::ResizeDone { wid, width, height });
    ts.pump();

    ts.with_stage(|stage| {
        let win = stage.lookup(wid).unwrap();
        assert_eq!((win.x, win.y), (0, 24));
        assert_eq!((win.width, win.height), (1280, 696));
    });
}

#[test]
fn compose_after_compose_is_a_no_op() {
    let mut ts = TestServer::new(128, 128);
    let client = ts.connect();
    client.hello(&mut ts);
    let (wid, bufid) = client.standard_window(&mut ts, 0, 0, 32, 32);
    client.fill_opaque(wid, bufid, 0xFF12_3456);
    ts.run_fade();

    client.send(&Message::Flip { wid });
    ts.compose();
    let first = ts.screen().pixels().to_vec();

    ts.compose();
    assert_eq!(ts.screen().pixels(), &first[..]);
    assert_eq!(ts.server.damage.pending(), 0);
}
