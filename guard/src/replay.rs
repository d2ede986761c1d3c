//! Offline replay of recorded connections.
//!
//! A [`Capture`] holds one player's packets in the order they crossed the
//! connection. Replaying pushes them through a real [`SessionRegistry`] and
//! stands in for the client: every probe the engine writes is answered after
//! a simulated round trip, so acknowledged server state behaves as it would
//! live. Probe answers recorded in the capture itself are not ours and are
//! ignored by the correlator like any other foreign confirmation.

use crate::checks::Check;
use crate::clock::ManualClock;
use crate::engine::{Guard, GuardOptions};
use crate::error::{GuardError, Result};
use crate::registry::SessionRegistry;
use crate::GuardConfig;
use log::{debug, info};
use parking_lot::Mutex;
use protocol::{
    Capture, CaptureRecord, ClientPacket, InboundPacket, OutboundPacket, PacketSink, PlayerId,
    ServerPacket, TransportError,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Plays the client's side of the probe exchange.
#[derive(Default)]
struct ReplaySink {
    answers: Mutex<Vec<ClientPacket>>,
}

impl ReplaySink {
    fn take(&self) -> Vec<ClientPacket> {
        std::mem::take(&mut *self.answers.lock())
    }
}

impl PacketSink for ReplaySink {
    fn send(&self, packet: ServerPacket) -> std::result::Result<(), TransportError> {
        let answer = match packet {
            ServerPacket::Ping { id } => ClientPacket::Pong { id },
            ServerPacket::WindowConfirmation {
                window_id,
                action_id,
                ..
            } => ClientPacket::WindowConfirmation {
                window_id,
                action_id,
                accepted: true,
            },
            _ => return Ok(()),
        };
        self.answers.lock().push(answer);
        Ok(())
    }
}

/// What a replay observed, taken right after the last packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub player: PlayerId,
    pub name: String,
    pub packets: usize,
    pub probes_answered: usize,
    /// Checks with at least one violation, in catalog order.
    pub violations: Vec<(&'static str, u32)>,
    /// Left and right clicks per second from the last completed sample.
    pub cps: (u32, u32),
}

impl ReplayReport {
    pub fn violations_of(&self, check: &str) -> u32 {
        self.violations
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(check))
            .map_or(0, |(_, count)| *count)
    }
}

pub struct Replayer {
    registry: SessionRegistry,
    clock: Arc<ManualClock>,
    /// Simulated client latency in milliseconds.
    rtt: u64,
}

impl Replayer {
    pub fn new(config: GuardConfig, runtime: Handle, rtt: u64) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(0));
        let options = GuardOptions {
            clock: clock.clone(),
            ..Default::default()
        };
        let guard = Guard::with_options(config, runtime, options)?;
        Ok(Self {
            registry: SessionRegistry::new(guard),
            clock,
            rtt,
        })
    }

    pub fn guard(&self) -> &Arc<Guard> {
        self.registry.guard()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Feeds `capture` through a fresh session.
    ///
    /// The session stays registered afterwards so alerts still buffered in
    /// their window can be delivered; call [`finish`](Self::finish) to drop it.
    pub fn replay(&self, capture: &Capture) -> Result<ReplayReport> {
        let player = capture.player;
        let sink = Arc::new(ReplaySink::default());
        if !self
            .registry
            .on_handshake(player, &capture.name, capture.version, sink.clone())
        {
            return Err(GuardError::Capture(format!(
                "{} is exempt from checking",
                capture.name
            )));
        }
        self.registry.on_login(player, false, None);
        info!(
            "Replaying {} packets of {} on protocol {}",
            capture.records.len(),
            capture.name,
            capture.version
        );

        let mut in_flight: VecDeque<(u64, ClientPacket)> = VecDeque::new();
        let mut answered = 0;

        for record in &capture.records {
            let now = record.timestamp();
            while in_flight.front().is_some_and(|(due, _)| *due <= now) {
                if let Some((due, answer)) = in_flight.pop_front() {
                    self.answer(player, due, answer);
                    answered += 1;
                }
            }

            self.clock.set(now);
            match record {
                CaptureRecord::Inbound { timestamp, packet } => {
                    let mut packet = InboundPacket::new(packet.clone(), *timestamp);
                    self.registry.handle_inbound(player, &mut packet);
                }
                CaptureRecord::Outbound { timestamp, packet } => {
                    let mut packet = OutboundPacket::new(packet.clone(), *timestamp);
                    self.registry.handle_outbound(player, &mut packet);
                    if packet.is_cancelled() {
                        debug!("Outbound {} cancelled", packet.packet.name());
                    } else {
                        packet.flushed();
                    }
                }
            }

            let due = now + self.rtt;
            in_flight.extend(sink.take().into_iter().map(|answer| (due, answer)));
        }

        while let Some((due, answer)) = in_flight.pop_front() {
            self.answer(player, due, answer);
            answered += 1;
        }

        let (violations, cps) = self.registry.with_session(player, |session| {
            let violations: Vec<(&'static str, u32)> = session
                .checks()
                .map(|checks| {
                    checks
                        .iter()
                        .map(|check| (check.core().name(), check.core().violations()))
                        .filter(|(_, count)| *count > 0)
                        .collect()
                })
                .unwrap_or_default();
            let clicks = session.clicks();
            (violations, (clicks.left_cps(), clicks.right_cps()))
        })?;

        Ok(ReplayReport {
            player,
            name: capture.name.clone(),
            packets: capture.records.len(),
            probes_answered: answered,
            violations,
            cps,
        })
    }

    fn answer(&self, player: PlayerId, due: u64, answer: ClientPacket) {
        self.clock.set(due);
        let mut packet = InboundPacket::new(answer, due);
        self.registry.handle_inbound(player, &mut packet);
    }

    /// Disconnects the replayed player, discarding anything still buffered.
    pub fn finish(&self, player: PlayerId) {
        self.registry.on_disconnect(player);
    }
}
