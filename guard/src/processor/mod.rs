//! Ordered packet processors that keep [`PlayerState`] in step with the
//! connection. Processors run before checks see a packet.

mod inbound;
mod outbound;

pub use inbound::{
    ClientBrandProcessor, InboundActionProcessor, InboundInventoryProcessor, LatencyAckProcessor,
};
pub use outbound::{
    OutboundInventoryProcessor, OutboundStateProcessor, OutboundTotemProcessor,
    player_inventory_to_window_slot,
};

use crate::event::InternalEvent;
use crate::latency::LatencyCorrelator;
use crate::player::PlayerState;
use protocol::{ClientPacket, InboundPacket, OutboundPacket, PlayerId, ProtocolVersion};
use std::sync::Arc;

/// Whether `packet` closes a client tick: the explicit tick-end packet on
/// clients that send one, movement packets otherwise.
pub fn is_tick_end(version: ProtocolVersion, packet: &ClientPacket) -> bool {
    if version.has_client_tick_end() {
        matches!(packet, ClientPacket::ClientTickEnd)
    } else {
        packet.is_flying()
    }
}

pub struct ProcessorContext<'a> {
    pub player: PlayerId,
    pub version: ProtocolVersion,
    pub state: &'a mut PlayerState,
    pub latency: &'a Arc<LatencyCorrelator<PlayerState>>,
    events: &'a mut Vec<InternalEvent>,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(
        player: PlayerId,
        version: ProtocolVersion,
        state: &'a mut PlayerState,
        latency: &'a Arc<LatencyCorrelator<PlayerState>>,
        events: &'a mut Vec<InternalEvent>,
    ) -> Self {
        Self {
            player,
            version,
            state,
            latency,
            events,
        }
    }

    /// Queues an internal event; the session publishes it once the
    /// processor chain has finished.
    pub fn emit(&mut self, event: InternalEvent) {
        self.events.push(event);
    }

    pub fn is_tick_end(&self, packet: &ClientPacket) -> bool {
        is_tick_end(self.version, packet)
    }
}

pub trait InboundProcessor: Send {
    fn handle_inbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut InboundPacket);

    /// Runs after checks have seen the packet.
    fn handle_inbound_post(&mut self, _ctx: &mut ProcessorContext<'_>, _packet: &InboundPacket) {}
}

pub trait OutboundProcessor: Send {
    fn handle_outbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut OutboundPacket);
}

pub fn inbound_chain() -> Vec<Box<dyn InboundProcessor>> {
    vec![
        Box::new(LatencyAckProcessor),
        Box::new(InboundInventoryProcessor),
        Box::new(InboundActionProcessor),
        Box::new(ClientBrandProcessor::default()),
    ]
}

pub fn outbound_chain() -> Vec<Box<dyn OutboundProcessor>> {
    vec![
        Box::new(OutboundTotemProcessor),
        Box::new(OutboundInventoryProcessor),
        Box::new(OutboundStateProcessor),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use protocol::{PacketSink, ServerPacket, TransportError};

    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<ServerPacket>>,
    }

    impl PacketSink for RecordingSink {
        fn send(&self, packet: ServerPacket) -> Result<(), TransportError> {
            self.sent.lock().push(packet);
            Ok(())
        }
    }

    impl RecordingSink {
        pub fn last_probe(&self) -> Option<i16> {
            self.sent.lock().iter().rev().find_map(|packet| match packet {
                ServerPacket::Ping { id } => i16::try_from(*id).ok(),
                ServerPacket::WindowConfirmation { action_id, .. } => Some(*action_id),
                _ => None,
            })
        }
    }

    pub struct Harness {
        pub player: PlayerId,
        pub version: ProtocolVersion,
        pub state: PlayerState,
        pub latency: Arc<LatencyCorrelator<PlayerState>>,
        pub sink: Arc<RecordingSink>,
        pub events: Vec<InternalEvent>,
    }

    impl Harness {
        pub fn new(version: ProtocolVersion) -> Self {
            let sink = Arc::new(RecordingSink::default());
            let latency = Arc::new(LatencyCorrelator::new(
                sink.clone(),
                Arc::new(ManualClock::new(0)),
                version,
            ));
            Self {
                player: uuid::Uuid::new_v4(),
                version,
                state: PlayerState::default(),
                latency,
                sink,
                events: Vec::new(),
            }
        }

        pub fn inbound(&mut self, processor: &mut dyn InboundProcessor, packet: &mut InboundPacket) {
            let mut ctx = ProcessorContext::new(
                self.player,
                self.version,
                &mut self.state,
                &self.latency,
                &mut self.events,
            );
            processor.handle_inbound(&mut ctx, packet);
            processor.handle_inbound_post(&mut ctx, packet);
        }

        pub fn outbound(&mut self, processor: &mut dyn OutboundProcessor, packet: &mut OutboundPacket) {
            let mut ctx = ProcessorContext::new(
                self.player,
                self.version,
                &mut self.state,
                &self.latency,
                &mut self.events,
            );
            processor.handle_outbound(&mut ctx, packet);
        }
    }
}
