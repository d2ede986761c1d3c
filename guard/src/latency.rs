//! Round-trip probes used to learn when the client has caught up.
//!
//! At most one probe is in flight per connection. Every scheduling call
//! attaches its callback to that probe; only the call that arms a fresh
//! probe (or finds it still unsent) writes it. When the matching response
//! arrives the probe is retired and its callbacks are handed back to the
//! caller, which runs them against the session state.
//!
//! Probe ids live in a reserved band of the 16-bit id space so they never
//! collide with confirmations issued by other plugins on the same channel.

use crate::clock::Clock;
use log::{debug, error, warn};
use parking_lot::Mutex;
use protocol::{ClientPacket, OutboundPacket, PacketSink, ProtocolVersion, ServerPacket};
use rand::Rng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const PROBE_NAMESPACE: u16 = 0xA;
const COUNTER_MASK: u16 = 0x07FF;

/// Maps a rolling counter into the reserved, always negative, id band.
pub fn probe_id(counter: u16) -> i16 {
    (0x8000 | (PROBE_NAMESPACE << 11) | (counter & COUNTER_MASK)) as i16
}

/// Extracts the id from a packet that may answer a probe.
pub fn probe_response_id(packet: &ClientPacket) -> Option<i16> {
    match packet {
        ClientPacket::WindowConfirmation { action_id, .. } if *action_id <= 0 => Some(*action_id),
        ClientPacket::Pong { id } => i16::try_from(*id).ok(),
        _ => None,
    }
}

/// Timing of an acknowledged probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckInfo {
    pub id: i16,
    pub sent_at: u64,
    pub acked_at: u64,
    pub rtt: u64,
}

pub type AckCallback<T> = Box<dyn FnOnce(&mut T, &AckInfo) + Send>;

struct InFlightProbe<T> {
    id: i16,
    callbacks: Vec<AckCallback<T>>,
    /// `None` until the probe has been handed to the sink.
    sent_at: Option<u64>,
    send_ticket: u64,
}

struct ProbeState<T> {
    in_flight: Option<InFlightProbe<T>>,
    counter: u16,
}

impl<T> ProbeState<T> {
    fn arm(&mut self) -> &mut InFlightProbe<T> {
        if self.in_flight.is_none() {
            self.counter = (self.counter + 1) & COUNTER_MASK;
        }
        let id = probe_id(self.counter);
        self.in_flight.get_or_insert_with(|| InFlightProbe {
            id,
            callbacks: Vec::new(),
            sent_at: None,
            send_ticket: 0,
        })
    }
}

/// Callbacks released by an acknowledgement, ready to run.
pub struct Acknowledged<T> {
    pub info: AckInfo,
    callbacks: Vec<AckCallback<T>>,
}

impl<T> Acknowledged<T> {
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Runs every callback once. A panicking callback is logged and the
    /// rest still run.
    pub fn run(self, target: &mut T) {
        let info = self.info;
        for callback in self.callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(target, &info))).is_err() {
                error!("Callback for probe {} panicked", info.id);
            }
        }
    }
}

pub struct LatencyCorrelator<T> {
    sink: Arc<dyn PacketSink>,
    clock: Arc<dyn Clock>,
    version: ProtocolVersion,
    state: Mutex<ProbeState<T>>,
    last_rtt: AtomicU64,
    last_ack_at: AtomicU64,
}

const NO_RTT: u64 = u64::MAX;

impl<T: 'static> LatencyCorrelator<T> {
    pub fn new(sink: Arc<dyn PacketSink>, clock: Arc<dyn Clock>, version: ProtocolVersion) -> Self {
        let counter = rand::thread_rng().gen_range(0..=COUNTER_MASK);
        Self {
            sink,
            clock,
            version,
            state: Mutex::new(ProbeState {
                in_flight: None,
                counter,
            }),
            last_rtt: AtomicU64::new(NO_RTT),
            last_ack_at: AtomicU64::new(0),
        }
    }

    /// Schedules `callback` for the next acknowledgement, sending a probe
    /// right away unless one is already on the wire.
    pub fn run_after_next_ack(&self, callback: impl FnOnce(&mut T, &AckInfo) + Send + 'static) {
        let id = {
            let mut state = self.state.lock();
            let probe = state.arm();
            probe.callbacks.push(Box::new(callback));
            if probe.sent_at.is_some() {
                return;
            }
            probe.sent_at = Some(self.clock.now_millis());
            probe.id
        };
        self.write_probe(id);
    }

    /// Like [`run_after_next_ack`](Self::run_after_next_ack), but the probe
    /// is only written once `packet` has been flushed, so the client handles
    /// `packet` before it can answer.
    pub fn run_after_next_ack_following(
        self: &Arc<Self>,
        packet: &mut OutboundPacket,
        callback: impl FnOnce(&mut T, &AckInfo) + Send + 'static,
    ) {
        let (id, ticket) = {
            let mut state = self.state.lock();
            let probe = state.arm();
            probe.callbacks.push(Box::new(callback));
            if probe.sent_at.is_some() {
                return;
            }
            probe.send_ticket += 1;
            (probe.id, probe.send_ticket)
        };

        let correlator = Arc::downgrade(self);
        packet.after_flush(move || {
            if let Some(correlator) = correlator.upgrade() {
                correlator.send_if_latest(id, ticket);
            }
        });
    }

    /// Writes the probe unless it was sent meanwhile, retired, or re-armed
    /// by a later outbound packet.
    fn send_if_latest(&self, id: i16, ticket: u64) {
        {
            let mut state = self.state.lock();
            let Some(probe) = state.in_flight.as_mut() else {
                return;
            };
            if probe.id != id || probe.sent_at.is_some() || probe.send_ticket != ticket {
                return;
            }
            probe.sent_at = Some(self.clock.now_millis());
        }
        self.write_probe(id);
    }

    fn write_probe(&self, id: i16) {
        let packet = if self.version.uses_ping_probes() {
            ServerPacket::Ping { id: id as i32 }
        } else {
            ServerPacket::WindowConfirmation {
                window_id: 0,
                action_id: id,
                accepted: false,
            }
        };

        match self.sink.send(packet) {
            Ok(()) => debug!("Sent probe {}", id),
            Err(e) => {
                warn!("Failed to send probe {}: {}", id, e);
                let mut state = self.state.lock();
                if state.in_flight.as_ref().map(|probe| probe.id) == Some(id) {
                    state.in_flight = None;
                }
            }
        }
    }

    /// Retires the in-flight probe if `id` matches it and it was sent.
    /// Anything else is noise from another subsystem and is ignored.
    pub fn acknowledge(&self, id: i16, received_at: u64) -> Option<Acknowledged<T>> {
        let probe = {
            let mut state = self.state.lock();
            let matches = state
                .in_flight
                .as_ref()
                .is_some_and(|probe| probe.id == id && probe.sent_at.is_some());
            if !matches {
                return None;
            }
            state.in_flight.take()?
        };

        let sent_at = probe.sent_at.unwrap_or(received_at);
        let rtt = received_at.saturating_sub(sent_at);
        self.last_rtt.store(rtt, Ordering::Relaxed);
        self.last_ack_at.store(received_at, Ordering::Relaxed);
        debug!("Probe {} acknowledged, rtt {}ms", id, rtt);

        Some(Acknowledged {
            info: AckInfo {
                id,
                sent_at,
                acked_at: received_at,
                rtt,
            },
            callbacks: probe.callbacks,
        })
    }

    pub fn last_rtt(&self) -> Option<u64> {
        match self.last_rtt.load(Ordering::Relaxed) {
            NO_RTT => None,
            rtt => Some(rtt),
        }
    }

    /// Time of the latest acknowledgement, 0 before the first one.
    pub fn last_ack_at(&self) -> u64 {
        self.last_ack_at.load(Ordering::Relaxed)
    }

    pub fn in_flight_id(&self) -> Option<i16> {
        self.state.lock().in_flight.as_ref().map(|probe| probe.id)
    }

    pub fn is_probe_sent(&self) -> bool {
        self.state
            .lock()
            .in_flight
            .as_ref()
            .is_some_and(|probe| probe.sent_at.is_some())
    }

    pub fn pending_callbacks(&self) -> usize {
        self.state
            .lock()
            .in_flight
            .as_ref()
            .map_or(0, |probe| probe.callbacks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use protocol::{ItemStack, TransportError};
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingSink {
        sent: parking_lot::Mutex<Vec<ServerPacket>>,
        fail: AtomicBool,
    }

    impl PacketSink for RecordingSink {
        fn send(&self, packet: ServerPacket) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.lock().push(packet);
            Ok(())
        }
    }

    impl RecordingSink {
        fn probe_ids(&self) -> Vec<i32> {
            self.sent
                .lock()
                .iter()
                .filter_map(|packet| match packet {
                    ServerPacket::Ping { id } => Some(*id),
                    ServerPacket::WindowConfirmation { action_id, .. } => Some(*action_id as i32),
                    _ => None,
                })
                .collect()
        }
    }

    fn correlator(
        version: ProtocolVersion,
    ) -> (Arc<LatencyCorrelator<Vec<u32>>>, Arc<RecordingSink>, Arc<ManualClock>) {
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(1_000));
        let correlator = Arc::new(LatencyCorrelator::new(sink.clone(), clock.clone(), version));
        (correlator, sink, clock)
    }

    #[test]
    fn test_probe_ids_stay_in_reserved_band() {
        for counter in [0u16, 1, 0x07FF, 0xFFFF] {
            let id = probe_id(counter) as u16;
            assert_eq!(id & 0x8000, 0x8000);
            assert_eq!((id >> 11) & 0xF, PROBE_NAMESPACE);
        }
        assert!(probe_id(0) < 0);
    }

    #[test]
    fn test_response_recognition() {
        let confirmation = |action_id| ClientPacket::WindowConfirmation {
            window_id: 0,
            action_id,
            accepted: true,
        };
        assert_eq!(probe_response_id(&confirmation(-5)), Some(-5));
        assert_eq!(probe_response_id(&confirmation(3)), None);
        assert_eq!(probe_response_id(&ClientPacket::Pong { id: -12_000 }), Some(-12_000));
        assert_eq!(probe_response_id(&ClientPacket::Pong { id: 70_000 }), None);
        assert_eq!(probe_response_id(&ClientPacket::ClientTickEnd), None);
    }

    #[test]
    fn test_single_flight_under_concurrency() {
        let (correlator, sink, clock) = correlator(ProtocolVersion::V1_20);

        std::thread::scope(|scope| {
            for i in 0..16u32 {
                let correlator = correlator.clone();
                scope.spawn(move || {
                    correlator.run_after_next_ack(move |seen: &mut Vec<u32>, _| seen.push(i));
                });
            }
        });

        let ids = sink.probe_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(correlator.pending_callbacks(), 16);

        clock.advance(40);
        let ack = correlator.acknowledge(ids[0] as i16, 1_050).unwrap();
        let mut seen = Vec::new();
        ack.run(&mut seen);

        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
        assert!(correlator.in_flight_id().is_none());
        assert!(correlator.acknowledge(ids[0] as i16, 1_060).is_none());
    }

    #[test]
    fn test_rtt_measured_from_send() {
        let (correlator, sink, clock) = correlator(ProtocolVersion::V1_20);
        clock.set(500);
        correlator.run_after_next_ack(|_, _| {});

        let id = sink.probe_ids()[0] as i16;
        let ack = correlator.acknowledge(id, 575).unwrap();
        assert_eq!(ack.info.rtt, 75);
        assert_eq!(correlator.last_rtt(), Some(75));
        assert_eq!(correlator.last_ack_at(), 575);
    }

    #[test]
    fn test_legacy_clients_get_window_confirmations() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_8);
        correlator.run_after_next_ack(|_, _| {});

        assert!(matches!(
            sink.sent.lock()[0],
            ServerPacket::WindowConfirmation { window_id: 0, accepted: false, .. }
        ));
    }

    #[test]
    fn test_unmatched_and_unsent_acks_are_ignored() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        let mut packet = OutboundPacket::new(ServerPacket::SetCursorItem { item: ItemStack::EMPTY }, 0);
        correlator.run_after_next_ack_following(&mut packet, |_, _| {});

        let id = correlator.in_flight_id().unwrap();
        assert!(sink.probe_ids().is_empty());
        assert!(correlator.acknowledge(id, 10).is_none(), "unsent probe must not be acknowledged");

        packet.flushed();
        assert_eq!(sink.probe_ids(), vec![id as i32]);
        assert!(correlator.acknowledge(id.wrapping_add(1), 10).is_none());
        assert!(correlator.acknowledge(id, 10).is_some());
    }

    #[test]
    fn test_stale_send_ticket_does_not_send() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        let mut first = OutboundPacket::new(ServerPacket::SetCursorItem { item: ItemStack::EMPTY }, 0);
        let mut second = OutboundPacket::new(ServerPacket::SetCursorItem { item: ItemStack::totem() }, 1);

        correlator.run_after_next_ack_following(&mut first, |seen: &mut Vec<u32>, _| seen.push(1));
        correlator.run_after_next_ack_following(&mut second, |seen: &mut Vec<u32>, _| seen.push(2));

        first.flushed();
        assert!(sink.probe_ids().is_empty());

        second.flushed();
        let ids = sink.probe_ids();
        assert_eq!(ids.len(), 1);

        let mut seen = Vec::new();
        correlator.acknowledge(ids[0] as i16, 5).unwrap().run(&mut seen);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_callbacks_after_send_join_in_flight_probe() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        correlator.run_after_next_ack(|seen: &mut Vec<u32>, _| seen.push(1));

        let mut packet = OutboundPacket::new(ServerPacket::Ping { id: 1 }, 0);
        correlator.run_after_next_ack_following(&mut packet, |seen: &mut Vec<u32>, _| seen.push(2));
        packet.flushed();

        let ids = sink.probe_ids();
        assert_eq!(ids.len(), 1);

        let mut seen = Vec::new();
        correlator.acknowledge(ids[0] as i16, 5).unwrap().run(&mut seen);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_transport_failure_discards_probe() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        sink.fail.store(true, Ordering::SeqCst);
        correlator.run_after_next_ack(|_, _| {});
        assert!(correlator.in_flight_id().is_none());

        sink.fail.store(false, Ordering::SeqCst);
        correlator.run_after_next_ack(|_, _| {});
        assert_eq!(sink.probe_ids().len(), 1);
        assert!(correlator.is_probe_sent());
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        correlator.run_after_next_ack(|_: &mut Vec<u32>, _| panic!("broken callback"));
        correlator.run_after_next_ack(|seen: &mut Vec<u32>, _| seen.push(7));

        let id = sink.probe_ids()[0] as i16;
        let mut seen = Vec::new();
        correlator.acknowledge(id, 1).unwrap().run(&mut seen);
        assert_eq!(seen, vec![7]);
    }

    #[test]
    fn test_flush_after_teardown_is_noop() {
        let (correlator, sink, _) = correlator(ProtocolVersion::V1_20);
        let mut packet = OutboundPacket::new(ServerPacket::Ping { id: 1 }, 0);
        correlator.run_after_next_ack_following(&mut packet, |_, _| {});

        drop(correlator);
        packet.flushed();
        assert!(sink.probe_ids().is_empty());
    }
}
