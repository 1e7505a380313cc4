//! Connected clients
//!
//! Tracks each client's byte order, its request sequence number and the
//! channel its outgoing packets are written to.

use std::collections::HashMap;

use area_randr_proto::{ByteOrder, OutputPropertyNotify};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::notify::EventSink;

/// Packets a client may have queued before it is considered stuck
pub const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

/// Outgoing packets for one connection, in the order they were produced.
/// When the queue fills up the connection is told to close once through
/// the overflow signal.
#[derive(Debug)]
pub struct Outbox {
    packets: mpsc::Sender<Vec<u8>>,
    overflow: Option<oneshot::Sender<()>>,
}

impl Outbox {
    /// Returns the outbox with the packet stream the connection writes from
    /// and the signal it closes on
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>, oneshot::Receiver<()>) {
        let (packets, rx) = mpsc::channel(capacity);
        let (overflow, overflow_rx) = oneshot::channel();
        let outbox = Self {
            packets,
            overflow: Some(overflow),
        };
        (outbox, rx, overflow_rx)
    }

    fn push(&mut self, id: ClientId, packet: Vec<u8>) {
        match self.packets.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if let Some(overflow) = self.overflow.take() {
                    warn!("Client {} is not reading its queue, disconnecting", id.0);
                    let _ = overflow.send(());
                }
            }
            Err(TrySendError::Closed(_)) => debug!("Client {} outbox closed", id.0),
        }
    }
}

#[derive(Debug)]
struct ClientState {
    order: ByteOrder,
    /// Sequence number of the last request processed
    sequence: u16,
    outbox: Outbox,
}

#[derive(Debug)]
pub struct ClientTable {
    clients: HashMap<ClientId, ClientState>,
    first_event: u8,
}

impl ClientTable {
    pub fn new(first_event: u8) -> Self {
        Self {
            clients: HashMap::new(),
            first_event,
        }
    }

    pub fn add(&mut self, id: ClientId, order: ByteOrder, outbox: Outbox) {
        debug!("Client {} connected ({:?})", id.0, order);
        self.clients.insert(
            id,
            ClientState {
                order,
                sequence: 0,
                outbox,
            },
        );
    }

    pub fn remove(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn order(&self, id: ClientId) -> Option<ByteOrder> {
        self.clients.get(&id).map(|c| c.order)
    }

    pub fn sequence(&self, id: ClientId) -> Option<u16> {
        self.clients.get(&id).map(|c| c.sequence)
    }

    /// Advance to the next request and return its sequence number
    pub fn next_sequence(&mut self, id: ClientId) -> Option<u16> {
        let client = self.clients.get_mut(&id)?;
        client.sequence = client.sequence.wrapping_add(1);
        Some(client.sequence)
    }

    /// Queue raw bytes for a client
    pub fn send(&mut self, id: ClientId, packet: Vec<u8>) {
        let Some(client) = self.clients.get_mut(&id) else {
            warn!("Dropping packet for unknown client {}", id.0);
            return;
        };
        client.outbox.push(id, packet);
    }
}

impl EventSink for ClientTable {
    fn deliver(&mut self, client: ClientId, event: &OutputPropertyNotify) {
        let Some(state) = self.clients.get(&client) else {
            return;
        };
        let packet = event.serialize(state.order, self.first_event, state.sequence);
        self.send(client, packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_randr_proto::PropertyState;

    #[test]
    fn test_sequence_wraps() {
        let (tx, _rx, _overflow) = Outbox::new(OUTBOX_CAPACITY);
        let mut clients = ClientTable::new(89);
        clients.add(ClientId(1), ByteOrder::Lsb, tx);
        assert_eq!(clients.next_sequence(ClientId(1)), Some(1));
        for _ in 0..u16::MAX {
            clients.next_sequence(ClientId(1));
        }
        assert_eq!(clients.sequence(ClientId(1)), Some(0));
        assert_eq!(clients.next_sequence(ClientId(2)), None);
    }

    #[test]
    fn test_deliver_serializes_in_client_order() {
        let (tx, mut rx, _overflow) = Outbox::new(OUTBOX_CAPACITY);
        let mut clients = ClientTable::new(89);
        clients.add(ClientId(1), ByteOrder::Msb, tx);
        clients.next_sequence(ClientId(1));

        let event = OutputPropertyNotify {
            window: 0x100,
            output: 0x42,
            atom: 90,
            timestamp: 1,
            state: PropertyState::NewValue,
        };
        clients.deliver(ClientId(1), &event);

        let packet = rx.try_recv().unwrap();
        assert_eq!(packet, event.serialize(ByteOrder::Msb, 89, 1));
        assert_eq!(&packet[2..4], &[0, 1]);
    }

    #[test]
    fn test_full_outbox_signals_overflow_once() {
        let (tx, mut rx, mut overflow) = Outbox::new(2);
        let mut clients = ClientTable::new(89);
        clients.add(ClientId(1), ByteOrder::Lsb, tx);

        clients.send(ClientId(1), vec![1]);
        clients.send(ClientId(1), vec![2]);
        assert!(overflow.try_recv().is_err());

        clients.send(ClientId(1), vec![3]);
        assert_eq!(overflow.try_recv(), Ok(()));
        clients.send(ClientId(1), vec![4]);

        assert_eq!(rx.try_recv().unwrap(), vec![1]);
        assert_eq!(rx.try_recv().unwrap(), vec![2]);
        assert!(rx.try_recv().is_err());
    }
}
