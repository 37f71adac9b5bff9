//! The client datagram channel
//!
//! The server multiplexes all clients over one local datagram channel: each
//! inbound packet carries the source client id the transport stamped on it,
//! and outbound packets are addressed per client. The real transport is an OS
//! facility; this module defines its contract and a loopback implementation
//! over in-process queues, which preserves the properties the dispatcher
//! relies on:
//!
//! - packets from one client arrive in send order;
//! - outbound packets to one client are delivered in send order;
//! - a client disconnect surfaces as exactly one empty packet, observed at
//!   the next packet boundary;
//! - sends to a vanished client are swallowed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use protocol::{ClientId, Message};

/// One inbound datagram. An empty payload signals that the source
/// disconnected.
#[derive(Debug)]
pub struct Packet {
    pub source: ClientId,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn is_disconnect(&self) -> bool {
        self.payload.is_empty()
    }
}

struct Hub {
    inbound: Sender<Packet>,
    clients: Mutex<HashMap<ClientId, Sender<Vec<u8>>>>,
    next_client: AtomicU32,
}

/// Server side of the channel: the dispatcher blocks on [`listen`].
///
/// The receiver sits behind a mutex only so the channel can be shared with
/// the render thread (which never listens); the dispatcher is the sole
/// caller of `listen`.
///
/// [`listen`]: ServerChannel::listen
pub struct ServerChannel {
    rx: Mutex<Receiver<Packet>>,
    hub: Arc<Hub>,
}

impl ServerChannel {
    /// Bind a fresh channel. Clients connect through [`connector`].
    ///
    /// [`connector`]: ServerChannel::connector
    pub fn bind() -> Self {
        let (tx, rx) = channel();
        ServerChannel {
            rx: Mutex::new(rx),
            hub: Arc::new(Hub {
                inbound: tx,
                clients: Mutex::new(HashMap::new()),
                next_client: AtomicU32::new(1),
            }),
        }
    }

    /// Handle that new clients (and input source threads) connect through.
    pub fn connector(&self) -> Connector {
        Connector { hub: Arc::clone(&self.hub) }
    }

    /// Block until the next packet arrives.
    pub fn listen(&self) -> Packet {
        // The server keeps a connector alive, so the sender side never fully
        // drops while the server runs.
        self.rx.lock().unwrap().recv().expect("channel hub dropped")
    }

    /// Non-blocking variant for single-stepped servers.
    pub fn try_listen(&self) -> Option<Packet> {
        self.rx.lock().unwrap().try_recv().ok()
    }

    /// Send a message to one client. Delivery to a vanished client is
    /// silently dropped.
    pub fn send(&self, dest: ClientId, msg: &Message) {
        let clients = self.hub.clients.lock().unwrap();
        if let Some(tx) = clients.get(&dest) {
            if tx.send(msg.encode()).is_err() {
                tracing::debug!(client = %dest, "send to disconnected client dropped");
            }
        } else {
            tracing::debug!(client = %dest, "send to unknown client dropped");
        }
    }

    /// Send a message to every connected client.
    pub fn broadcast(&self, msg: &Message) {
        let payload = msg.encode();
        let clients = self.hub.clients.lock().unwrap();
        for tx in clients.values() {
            let _ = tx.send(payload.clone());
        }
    }
}

/// Connection point handed to clients.
#[derive(Clone)]
pub struct Connector {
    hub: Arc<Hub>,
}

impl Connector {
    /// Open a client endpoint with a fresh id.
    pub fn connect(&self) -> ClientChannel {
        let id = ClientId(self.hub.next_client.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = channel();
        self.hub.clients.lock().unwrap().insert(id, tx);
        ClientChannel {
            id,
            hub: Arc::clone(&self.hub),
            rx,
        }
    }
}

/// Client side of the channel.
///
/// Dropping the endpoint injects the disconnect packet the dispatcher uses
/// to tear down the client's windows.
pub struct ClientChannel {
    id: ClientId,
    hub: Arc<Hub>,
    rx: Receiver<Vec<u8>>,
}

impl ClientChannel {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Send a message to the server.
    pub fn send(&self, msg: &Message) {
        let _ = self.hub.inbound.send(Packet {
            source: self.id,
            payload: msg.encode(),
        });
    }

    /// Block until the server sends something.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    /// Take the next pending server message, if any.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        self.hub.clients.lock().unwrap().remove(&self.id);
        let _ = self.hub.inbound.send(Packet {
            source: self.id,
            payload: Vec::new(),
        });
    }
}
