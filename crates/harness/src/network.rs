//! In-process network with latency and loss.
//!
//! Every packet is encoded on send and decoded on delivery, so the wire
//! codec sits on the same path it would over a socket. Reliable packets
//! all take the same latency and arrive in send order. Unreliable packets
//! take `avg ± margin` and may be dropped, which reorders them freely.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use asteroid_wire::{Delivery, Packet, WireError};
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Receiving side of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Server,
    Client(usize),
}

/// Latency and loss model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConditions {
    pub reliable_latency_ms: u64,
    pub unreliable_latency_ms: u64,
    pub unreliable_margin_ms: u64,
    pub packet_loss: f64,
}

impl NetworkConditions {
    /// Instant delivery, nothing lost.
    pub const PERFECT: Self = Self {
        reliable_latency_ms: 0,
        unreliable_latency_ms: 0,
        unreliable_margin_ms: 0,
        packet_loss: 0.0,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub bytes_sent: u64,
}

#[derive(Debug)]
struct InFlight {
    deliver_at_ms: u64,
    /// Send order, breaks ties between equal delivery times.
    seq: u64,
    to: Endpoint,
    datagram: Bytes,
}

impl InFlight {
    fn key(&self) -> (u64, u64) {
        (self.deliver_at_ms, self.seq)
    }
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed: the heap pops the earliest delivery first.
impl Ord for InFlight {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

pub struct LoopbackNetwork {
    conditions: NetworkConditions,
    rng: ChaCha8Rng,
    in_flight: BinaryHeap<InFlight>,
    next_seq: u64,
    stats: NetworkStats,
}

impl LoopbackNetwork {
    pub fn new(conditions: NetworkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            in_flight: BinaryHeap::new(),
            next_seq: 0,
            stats: NetworkStats::default(),
        }
    }

    /// Put `packet` on the wire toward `to` at time `now_ms`.
    pub fn send(&mut self, to: Endpoint, delivery: Delivery, packet: &Packet, now_ms: u64) {
        let datagram = packet.encode();
        self.stats.sent += 1;
        self.stats.bytes_sent += datagram.len() as u64;

        let latency_ms = match delivery {
            Delivery::Reliable => self.conditions.reliable_latency_ms,
            Delivery::Unreliable => {
                if self.conditions.packet_loss > 0.0
                    && self.rng.gen_bool(self.conditions.packet_loss)
                {
                    self.stats.dropped += 1;
                    trace!(?to, packet_type = ?packet.packet_type(), "datagram lost");
                    return;
                }
                let avg = self.conditions.unreliable_latency_ms;
                let margin = self.conditions.unreliable_margin_ms;
                self.rng.gen_range(avg.saturating_sub(margin)..=avg + margin)
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.push(InFlight {
            deliver_at_ms: now_ms + latency_ms,
            seq,
            to,
            datagram,
        });
    }

    /// Every packet due at `now_ms`, in delivery order.
    pub fn deliver_due(&mut self, now_ms: u64) -> Result<Vec<(Endpoint, Packet)>, WireError> {
        let mut delivered = Vec::new();
        while self
            .in_flight
            .peek()
            .is_some_and(|datagram| datagram.deliver_at_ms <= now_ms)
        {
            let Some(datagram) = self.in_flight.pop() else {
                break;
            };
            let packet = Packet::decode(&datagram.datagram)?;
            self.stats.delivered += 1;
            delivered.push((datagram.to, packet));
        }
        Ok(delivered)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteroid_wire::{StartGamePacket, WinGamePacket};

    fn start(start_time_ms: u64) -> Packet {
        Packet::StartGame(StartGamePacket { start_time_ms })
    }

    fn lossy() -> NetworkConditions {
        NetworkConditions {
            reliable_latency_ms: 30,
            unreliable_latency_ms: 40,
            unreliable_margin_ms: 20,
            packet_loss: 0.3,
        }
    }

    #[test]
    fn test_reliable_in_order_after_latency() {
        let mut network = LoopbackNetwork::new(lossy(), 7);
        for i in 0..20 {
            network.send(Endpoint::Client(0), Delivery::Reliable, &start(i), 100);
        }
        assert!(network.deliver_due(129).unwrap().is_empty());

        let delivered = network.deliver_due(130).unwrap();
        let expected: Vec<_> = (0..20).map(|i| (Endpoint::Client(0), start(i))).collect();
        assert_eq!(delivered, expected);
        assert_eq!(network.stats().dropped, 0);
    }

    #[test]
    fn test_unreliable_latency_within_margin() {
        let conditions = NetworkConditions {
            packet_loss: 0.0,
            ..lossy()
        };
        let mut network = LoopbackNetwork::new(conditions, 7);
        for _ in 0..50 {
            network.send(
                Endpoint::Server,
                Delivery::Unreliable,
                &Packet::WinGame(WinGamePacket { winner: 0 }),
                0,
            );
        }
        assert!(network.deliver_due(19).unwrap().is_empty());
        assert_eq!(network.deliver_due(60).unwrap().len(), 50);
    }

    #[test]
    fn test_loss_is_seeded() {
        let run = |seed| {
            let mut network = LoopbackNetwork::new(lossy(), seed);
            for i in 0..200 {
                network.send(Endpoint::Server, Delivery::Unreliable, &start(i), i);
            }
            let delivered = network.deliver_due(u64::MAX).unwrap();
            (network.stats(), delivered)
        };
        let (stats, delivered) = run(3);
        assert!(stats.dropped > 0);
        assert_eq!(stats.dropped + stats.delivered, 200);
        assert_eq!(run(3), (stats, delivered));
    }

    #[test]
    fn test_perfect_network_delivers_immediately() {
        let mut network = LoopbackNetwork::new(NetworkConditions::PERFECT, 0);
        network.send(Endpoint::Client(1), Delivery::Unreliable, &start(5), 40);
        assert_eq!(
            network.deliver_due(40).unwrap(),
            vec![(Endpoint::Client(1), start(5))]
        );
        assert_eq!(network.in_flight(), 0);
    }
}
