//! The message dispatcher
//!
//! The main thread blocks on the client channel and owns every mutation the
//! protocol can cause: registry changes, damage, gestures, subscriptions,
//! and the resize handshake. Protocol errors are logged and dropped without
//! closing the connection; operations that cannot proceed (unknown wid,
//! failed allocation) simply have no observable effect.
//!
//! An empty packet is the transport's disconnect signal: every window the
//! client owns begins its fade-out, and the client bucket and its
//! subscription are dropped. The windows' buffers are released later by the
//! renderer, when each fade completes.

use protocol::{Message, ProtocolError, WindowId};

use crate::channel::Packet;
use crate::input::{InputState, POINTER_SCALE};
use crate::server::{Outbox, Server};

impl Server {
    /// Serve packets forever. This is the main thread of the process.
    pub fn run(&self, input: &mut InputState) -> ! {
        loop {
            let packet = self.chan.listen();
            self.handle_packet(input, packet);
        }
    }

    /// Process a single inbound packet.
    pub fn handle_packet(&self, input: &mut InputState, packet: Packet) {
        let source = packet.source;

        if packet.is_disconnect() {
            self.client_disconnected(source);
            return;
        }

        let msg = match Message::decode(&packet.payload) {
            Ok(msg) => msg,
            Err(error @ ProtocolError::BadMagic(_)) => {
                tracing::warn!(client = %source, %error, "dropping packet");
                return;
            }
            Err(error) => {
                tracing::warn!(client = %source, %error, "dropping undecodable packet");
                return;
            }
        };

        match msg {
            Message::Hello => {
                tracing::info!(client = %source, "client connected");
                let (width, height) = self.size();
                self.chan.send(source, &Message::Welcome { width, height });
            }

            Message::WindowNew { width, height } => {
                let created = {
                    let mut stage = self.stage.lock().unwrap();
                    self.create_window(&mut stage, source, width, height)
                };
                if let Some((wid, bufid)) = created {
                    self.chan.send(source, &Message::WindowInit { wid, width, height, bufid });
                    self.notify_subscribers();
                }
            }

            Message::Flip { wid } => {
                let stage = self.stage.lock().unwrap();
                match stage.lookup(wid) {
                    Some(win) => self.damage.mark_window(win),
                    None => tracing::debug!(client = %source, %wid, "flip for unknown window"),
                }
            }

            Message::FlipRegion { wid, x, y, width, height } => {
                let stage = self.stage.lock().unwrap();
                if let Some(win) = stage.lookup(wid) {
                    self.damage.mark_window_relative(win, x, y, width, height);
                }
            }

            // Input-source packets. Accepted from any client; restricting
            // them to a privileged source id is the transport's concern.
            Message::KeyEvent { event } => self.handle_key_event(input, event),
            Message::MouseEvent { event } => self.handle_mouse_event(input, event),

            Message::WindowMove { wid, x, y } => {
                let mut stage = self.stage.lock().unwrap();
                match stage.lookup_mut(wid) {
                    Some(win) => {
                        self.damage.mark_window(win);
                        win.x = x;
                        win.y = y;
                        self.damage.mark_window(win);
                    }
                    None => tracing::debug!(client = %source, %wid, "move for unknown window"),
                }
            }

            Message::WindowClose { wid } => {
                let tick = self.tick();
                let mut stage = self.stage.lock().unwrap();
                if stage.contains(wid) {
                    stage.mark_for_close(wid, tick);
                    stage.remove_from_client(wid);
                }
            }

            Message::WindowStack { wid, z } => {
                let mut stage = self.stage.lock().unwrap();
                stage.reorder(wid, z);
            }

            Message::WindowFocus { wid } => {
                let mut outbox = Outbox::new();
                {
                    let mut stage = self.stage.lock().unwrap();
                    if stage.contains(wid) {
                        self.set_focus(&mut stage, Some(wid), &mut outbox);
                    }
                }
                self.flush(outbox);
            }

            Message::ResizeRequest { wid, width, height } => {
                let known = self.stage.lock().unwrap().contains(wid);
                if known {
                    self.chan.send(source, &Message::ResizeOffer { wid, width, height, bufid: 0 });
                }
            }

            Message::ResizeOffer { wid, width, height, .. } => {
                // Clients managing their own windows echo offers back
                let known = self.stage.lock().unwrap().contains(wid);
                if known {
                    self.chan.send(source, &Message::ResizeOffer { wid, width, height, bufid: 0 });
                }
            }

            Message::ResizeAccept { wid, width, height } => {
                let bufid = {
                    let mut stage = self.stage.lock().unwrap();
                    self.begin_resize(&mut stage, wid, width, height)
                };
                if let Some(bufid) = bufid {
                    self.chan.send(source, &Message::ResizeBufid { wid, width, height, bufid });
                }
            }

            Message::ResizeDone { wid, width, height } => {
                let mut stage = self.stage.lock().unwrap();
                self.finish_resize(&mut stage, wid, width, height);
            }

            Message::QueryWindows => {
                let ads = {
                    let stage = self.stage.lock().unwrap();
                    stage
                        .query_order()
                        .into_iter()
                        .filter_map(|wid| {
                            let win = stage.lookup(wid)?;
                            let mut ad = win.ad.clone().unwrap_or_default();
                            if stage.focused == Some(wid) {
                                ad.flags |= 1;
                            }
                            Some(Message::WindowAdvertise { wid, ad })
                        })
                        .collect::<Vec<_>>()
                };
                for ad in ads {
                    self.chan.send(source, &ad);
                }
                self.chan.send(
                    source,
                    &Message::WindowAdvertise { wid: WindowId(0), ad: Default::default() },
                );
            }

            Message::Subscribe => self.subscribe(source),
            Message::Unsubscribe => self.unsubscribe(source),

            Message::WindowAdvertise { wid, ad } => {
                let known = {
                    let mut stage = self.stage.lock().unwrap();
                    match stage.lookup_mut(wid) {
                        Some(win) => {
                            win.ad = Some(ad);
                            true
                        }
                        None => false,
                    }
                };
                if known {
                    self.notify_subscribers();
                }
            }

            Message::SessionEnd => {
                tracing::info!(client = %source, "session end requested");
                self.chan.broadcast(&Message::SessionEnd);
            }

            Message::KeyBind { modifiers, keycode, response } => {
                input.install_bind(modifiers, keycode, source, response);
                tracing::debug!(client = %source, keycode, "key binding installed");
            }

            Message::WindowDragStart { wid } => {
                let mut outbox = Outbox::new();
                {
                    let mut stage = self.stage.lock().unwrap();
                    if stage.contains(wid) {
                        let pointer = self.pointer();
                        self.start_move(
                            &mut stage,
                            input,
                            pointer.x / POINTER_SCALE,
                            pointer.y / POINTER_SCALE,
                            pointer.x,
                            pointer.y,
                            &mut outbox,
                        );
                    }
                }
                self.flush(outbox);
            }

            Message::WindowUpdateShape { wid, threshold } => {
                let mut stage = self.stage.lock().unwrap();
                if let Some(win) = stage.lookup_mut(wid) {
                    win.alpha_threshold = threshold;
                }
            }

            other => {
                tracing::warn!(client = %source, ?other, "unhandled message type");
            }
        }
    }

    /// Tear down a disconnected client: fade out its windows, drop its
    /// bucket and subscription. Buffers are released when each fade ends.
    fn client_disconnected(&self, client: protocol::ClientId) {
        tracing::info!(client = %client, "connection closed");
        self.unsubscribe(client);

        let tick = self.tick();
        let mut stage = self.stage.lock().unwrap();
        let wids = stage.drop_client(client);
        for wid in &wids {
            tracing::info!(client = %client, wid = %wid, "closing window of disconnected client");
            stage.mark_for_close(*wid, tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use protocol::{ClientId, Message, MAGIC};

    use crate::channel::ServerChannel;
    use crate::shm::ProcessShm;
    use crate::state::AnimMode;

    use super::*;

    fn server() -> Server {
        Server::new(
            "dispatch-test".into(),
            1280,
            720,
            ServerChannel::bind(),
            Arc::new(ProcessShm::new()),
        )
    }

    fn packet(source: u32, msg: &Message) -> Packet {
        Packet { source: ClientId(source), payload: msg.encode() }
    }

    #[test]
    fn hello_is_answered_with_the_screen_size() {
        let server = server();
        let client = server.chan.connector().connect();
        let mut input = InputState::new();

        server.handle_packet(&mut input, packet(client.id().0, &Message::Hello));

        let reply = Message::decode(&client.try_recv().unwrap()).unwrap();
        assert_eq!(reply, Message::Welcome { width: 1280, height: 720 });
    }

    #[test]
    fn bad_magic_is_dropped_without_reply() {
        let server = server();
        let client = server.chan.connector().connect();
        let mut input = InputState::new();

        let mut payload = Message::Hello.encode();
        payload[0] ^= 0x5a;
        assert_ne!(u32::from_le_bytes(payload[0..4].try_into().unwrap()), MAGIC);
        server.handle_packet(&mut input, Packet { source: client.id(), payload });

        assert!(client.try_recv().is_none());
    }

    #[test]
    fn flip_of_unknown_window_is_ignored() {
        let server = server();
        let mut input = InputState::new();
        server.handle_packet(&mut input, packet(9, &Message::Flip { wid: WindowId(42) }));
        assert_eq!(server.damage.pending(), 0);
    }

    #[test]
    fn subscribe_deduplicates() {
        let server = server();
        let mut input = InputState::new();
        server.handle_packet(&mut input, packet(5, &Message::Subscribe));
        server.handle_packet(&mut input, packet(5, &Message::Subscribe));
        assert_eq!(server.subscriber_count(), 1);

        server.handle_packet(&mut input, packet(5, &Message::Unsubscribe));
        assert_eq!(server.subscriber_count(), 0);
    }

    #[test]
    fn disconnect_fades_out_every_owned_window() {
        let server = server();
        let client = server.chan.connector().connect();
        let mut input = InputState::new();

        server.handle_packet(
            &mut input,
            packet(client.id().0, &Message::WindowNew { width: 8, height: 8 }),
        );
        server.handle_packet(
            &mut input,
            packet(client.id().0, &Message::WindowNew { width: 8, height: 8 }),
        );

        server.handle_packet(&mut input, Packet { source: client.id(), payload: Vec::new() });

        let stage = server.stage.lock().unwrap();
        assert_eq!(stage.window_count(), 2);
        assert_eq!(stage.client_count(), 0, "bucket must be dropped");
        for wid in stage.blit_order() {
            assert_eq!(stage.lookup(wid).unwrap().anim_mode, AnimMode::FadeOut);
        }
    }

    #[test]
    fn window_close_detaches_from_the_bucket_immediately() {
        let server = server();
        let client = server.chan.connector().connect();
        let mut input = InputState::new();

        server.handle_packet(
            &mut input,
            packet(client.id().0, &Message::WindowNew { width: 8, height: 8 }),
        );
        let wid = match Message::decode(&client.try_recv().unwrap()).unwrap() {
            Message::WindowInit { wid, .. } => wid,
            other => panic!("expected WindowInit, got {other:?}"),
        };

        server.handle_packet(&mut input, packet(client.id().0, &Message::WindowClose { wid }));

        let stage = server.stage.lock().unwrap();
        assert_eq!(stage.client_count(), 0);
        assert_eq!(stage.lookup(wid).unwrap().anim_mode, AnimMode::FadeOut);
    }

    #[test]
    fn session_end_reaches_every_client() {
        let server = server();
        let connector = server.chan.connector();
        let a = connector.connect();
        let b = connector.connect();
        let mut input = InputState::new();

        server.handle_packet(&mut input, packet(a.id().0, &Message::SessionEnd));

        assert_eq!(Message::decode(&a.try_recv().unwrap()).unwrap(), Message::SessionEnd);
        assert_eq!(Message::decode(&b.try_recv().unwrap()).unwrap(), Message::SessionEnd);
    }
}
