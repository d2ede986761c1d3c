//! One player connection and everything derived from its packet stream.
//!
//! A [`Session`] is created when the transport reports a handshake and only
//! runs checks once [`Session::on_login`] has been called. Processors keep
//! the [`PlayerState`] current from the first packet on, so state is already
//! accurate when checks start.

use crate::checks::{CheckContext, CheckRegistry};
use crate::engine::Guard;
use crate::event::{InternalEvent, InventoryChangedEvent, TotemReplenishedEvent};
use crate::inventory::ShadowInventory;
use crate::latency::LatencyCorrelator;
use crate::player::{ClickData, Data, PlayerState};
use crate::processor::{
    inbound_chain, outbound_chain, InboundProcessor, OutboundProcessor, ProcessorContext,
};
use log::{debug, info};
use protocol::{InboundPacket, OutboundPacket, PacketSink, PlayerId, ProtocolVersion};
use std::sync::Arc;

pub struct Session {
    id: PlayerId,
    name: String,
    version: ProtocolVersion,
    state: PlayerState,
    latency: Arc<LatencyCorrelator<PlayerState>>,
    inbound: Vec<Box<dyn InboundProcessor>>,
    outbound: Vec<Box<dyn OutboundProcessor>>,
    /// Built on login; `None` while the player is still connecting.
    checks: Option<CheckRegistry>,
    guard: Arc<Guard>,
}

impl Session {
    pub fn new(
        guard: Arc<Guard>,
        id: PlayerId,
        name: impl Into<String>,
        version: ProtocolVersion,
        sink: Arc<dyn PacketSink>,
    ) -> Self {
        let latency = Arc::new(LatencyCorrelator::new(sink, guard.clock().clone(), version));
        Self {
            id,
            name: name.into(),
            version,
            state: PlayerState::default(),
            latency,
            inbound: inbound_chain(),
            outbound: outbound_chain(),
            checks: None,
            guard,
        }
    }

    /// Builds the check set for this connection. Calling it again is a no-op.
    pub fn on_login(&mut self) {
        if self.checks.is_some() {
            return;
        }
        let guard = &self.guard;
        let registry = CheckRegistry::build(guard.catalog(), guard.config(), self.version);
        info!(
            "{} is ready on protocol {} with {} checks",
            self.name,
            self.version,
            registry.len()
        );
        self.checks = Some(registry);
    }

    /// Runs one inbound packet through processors, checks and the internal
    /// events it caused.
    pub fn handle_inbound(&mut self, packet: &mut InboundPacket) {
        let mut events = Vec::new();

        {
            let mut ctx = ProcessorContext::new(
                self.id,
                self.version,
                &mut self.state,
                &self.latency,
                &mut events,
            );
            for processor in self.inbound.iter_mut() {
                processor.handle_inbound(&mut ctx, packet);
            }
        }

        let packet: &InboundPacket = packet;
        self.with_checks(|checks, ctx| checks.on_packet_receive(ctx, packet));

        self.drain_inventory(&mut events);
        self.dispatch(events);

        let mut events = Vec::new();
        {
            let mut ctx = ProcessorContext::new(
                self.id,
                self.version,
                &mut self.state,
                &self.latency,
                &mut events,
            );
            for processor in self.inbound.iter_mut() {
                processor.handle_inbound_post(&mut ctx, packet);
            }
        }
        self.dispatch(events);
    }

    pub fn handle_outbound(&mut self, packet: &mut OutboundPacket) {
        let mut events = Vec::new();

        {
            let mut ctx = ProcessorContext::new(
                self.id,
                self.version,
                &mut self.state,
                &self.latency,
                &mut events,
            );
            for processor in self.outbound.iter_mut() {
                processor.handle_outbound(&mut ctx, packet);
            }
        }

        let packet: &OutboundPacket = packet;
        self.with_checks(|checks, ctx| checks.on_packet_send(ctx, packet));
        self.dispatch(events);
    }

    /// The one place updated slots are drained, once per read cycle.
    fn drain_inventory(&mut self, events: &mut Vec<InternalEvent>) {
        let inventory = &mut self.state.inventory;
        if !inventory.has_pending_updates() {
            return;
        }

        let changed_slots = inventory.take_updated_slots();
        let carried = inventory.take_updated_carried();
        let last_issuer = inventory.last_issuer();

        let mut replenished = Vec::new();
        for slot in &changed_slots {
            if !inventory.is_hand_slot(slot.index() as i32) || !slot.item().is_totem() {
                continue;
            }
            let Some(used_at) = self.state.totem.last_totem_use.take() else {
                continue;
            };
            let event = TotemReplenishedEvent {
                player: self.id,
                used_at,
                replenished_at: slot.updated_at(),
            };
            self.state.totem.record_interval(event.interval());
            debug!("{} replenished a totem after {}ms", self.name, event.interval());
            replenished.push(InternalEvent::TotemReplenished(event));
        }

        events.push(InternalEvent::InventoryChanged(InventoryChangedEvent {
            player: self.id,
            changed_slots,
            carried,
            last_issuer,
        }));
        events.extend(replenished);
    }

    /// Publishes each event on the bus, then hands it to this session's
    /// own checks.
    fn dispatch(&mut self, events: Vec<InternalEvent>) {
        for event in events {
            let bus = self.guard.bus();
            match &event {
                InternalEvent::InventoryChanged(e) => {
                    bus.publish(e.clone());
                }
                InternalEvent::TotemActivated(e) => {
                    bus.publish(*e);
                }
                InternalEvent::TotemReplenished(e) => {
                    bus.publish(*e);
                }
            }
            self.with_checks(|checks, ctx| checks.on_event(ctx, &event));
        }
    }

    fn with_checks(&mut self, f: impl FnOnce(&mut CheckRegistry, &mut CheckContext<'_>)) {
        let Session {
            id,
            name,
            version,
            state,
            checks,
            guard,
            ..
        } = self;
        let Some(checks) = checks.as_mut() else {
            return;
        };

        let mut ctx = CheckContext {
            player: *id,
            player_name: name.as_str(),
            version: *version,
            state,
            bus: guard.bus(),
            alerts: guard.alerts(),
            config: guard.config(),
        };
        f(checks, &mut ctx);
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn is_ready(&self) -> bool {
        self.checks.is_some()
    }

    pub fn inventory(&self) -> &ShadowInventory {
        &self.state.inventory
    }

    pub fn data(&self) -> &Data {
        &self.state.data
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Click rates from the last completed sample.
    pub fn clicks(&self) -> &ClickData {
        &self.state.clicks
    }

    pub fn brand(&self) -> Option<&str> {
        self.state.brand.as_deref()
    }

    pub fn latency(&self) -> &Arc<LatencyCorrelator<PlayerState>> {
        &self.latency
    }

    pub fn checks(&self) -> Option<&CheckRegistry> {
        self.checks.as_ref()
    }

    pub fn checks_mut(&mut self) -> Option<&mut CheckRegistry> {
        self.checks.as_mut()
    }

    /// Violation count of `check`, `None` before login or for unknown checks.
    pub fn violations(&self, check: &str) -> Option<u32> {
        self.checks.as_ref()?.violations(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GuardConfig;
    use crate::engine::GuardOptions;
    use crate::event::{EventOrder, TotemActivatedEvent};
    use crate::processor::test_support::RecordingSink;
    use parking_lot::Mutex;
    use protocol::{
        ClickType, ClientPacket, Hand, InteractAction, ItemStack, ServerPacket, SLOT_OFFHAND,
    };
    use tokio::runtime::Handle;
    use uuid::Uuid;

    fn session(version: ProtocolVersion) -> (Session, Arc<RecordingSink>) {
        let options = GuardOptions {
            clock: Arc::new(ManualClock::new(0)),
            ..Default::default()
        };
        let guard = Guard::with_options(GuardConfig::default(), Handle::current(), options).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let session = Session::new(guard, Uuid::new_v4(), "Steve", version, sink.clone());
        (session, sink)
    }

    fn inbound(session: &mut Session, packet: ClientPacket, timestamp: u64) {
        session.handle_inbound(&mut InboundPacket::new(packet, timestamp));
    }

    /// Sends a server packet, flushes it and acknowledges the probe that
    /// follows it.
    fn server_applied(session: &mut Session, sink: &RecordingSink, packet: ServerPacket, sent: u64, acked: u64) {
        let mut packet = OutboundPacket::new(packet, sent);
        session.handle_outbound(&mut packet);
        packet.flushed();
        if let Some(id) = sink.last_probe() {
            inbound(session, ClientPacket::Pong { id: id as i32 }, acked);
        }
    }

    fn click(slot: i32, changed: ItemStack, carried: ItemStack) -> ClientPacket {
        ClientPacket::ClickWindow {
            window_id: 0,
            slot,
            button: 0,
            click_type: ClickType::Pickup,
            changed_slots: Some(vec![(slot, changed)]),
            carried,
        }
    }

    fn attack() -> ClientPacket {
        ClientPacket::InteractEntity {
            entity_id: 3,
            action: InteractAction::Attack,
        }
    }

    #[tokio::test]
    async fn test_checks_wait_for_login() {
        let (mut session, _sink) = session(ProtocolVersion::V1_20);
        inbound(&mut session, click(20, ItemStack::EMPTY, ItemStack::EMPTY), 1);
        inbound(&mut session, attack(), 2);

        assert!(!session.is_ready());
        assert_eq!(session.violations("InventoryA"), None);
        // Tracked regardless, the attack closed nothing because no check ran.
        assert!(session.data().open_inventory());
    }

    #[tokio::test]
    async fn test_attack_with_open_inventory() {
        let (mut session, _sink) = session(ProtocolVersion::V1_20);
        session.on_login();

        inbound(&mut session, click(20, ItemStack::EMPTY, ItemStack::EMPTY), 1);
        assert!(session.data().open_inventory());

        inbound(&mut session, attack(), 2);
        assert_eq!(session.violations("InventoryA"), Some(1));
        assert!(!session.data().open_inventory());
    }

    #[tokio::test]
    async fn test_inventory_changes_published_once_per_cycle() {
        let (mut session, _sink) = session(ProtocolVersion::V1_20);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session
            .guard
            .bus()
            .subscribe(EventOrder::Normal, move |event: &mut InventoryChangedEvent| {
                sink.lock().push(event.changed_slots.len())
            });

        inbound(&mut session, click(20, ItemStack::totem(), ItemStack::EMPTY), 1);
        inbound(&mut session, ClientPacket::Flying { on_ground: true }, 2);

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_server_updates_apply_on_ack() {
        let (mut session, sink) = session(ProtocolVersion::V1_20);
        let mut packet = OutboundPacket::new(
            ServerPacket::SetSlot {
                window_id: 0,
                slot: SLOT_OFFHAND as i32,
                item: ItemStack::totem(),
            },
            10,
        );
        session.handle_outbound(&mut packet);
        packet.flushed();
        assert!(session.inventory().off_hand().is_empty());

        let id = sink.last_probe().unwrap();
        inbound(&mut session, ClientPacket::Pong { id: id as i32 }, 80);
        assert!(session.inventory().off_hand().is_totem());
        assert_eq!(session.latency().last_ack_at(), 80);
    }

    #[tokio::test]
    async fn test_totem_pop_and_replenish() {
        let (mut session, sink) = session(ProtocolVersion::V1_20);
        let activations = Arc::new(Mutex::new(Vec::new()));
        let replenishes = Arc::new(Mutex::new(Vec::new()));
        let a = activations.clone();
        session
            .guard
            .bus()
            .subscribe(EventOrder::Normal, move |event: &mut TotemActivatedEvent| {
                a.lock().push(event.timestamp)
            });
        let r = replenishes.clone();
        session
            .guard
            .bus()
            .subscribe(EventOrder::Normal, move |event: &mut TotemReplenishedEvent| {
                r.lock().push(event.interval())
            });

        let offhand = SLOT_OFFHAND as i32;
        server_applied(
            &mut session,
            &sink,
            ServerPacket::SetSlot { window_id: 0, slot: offhand, item: ItemStack::totem() },
            0,
            50,
        );
        server_applied(
            &mut session,
            &sink,
            ServerPacket::SetSlot { window_id: 0, slot: offhand, item: ItemStack::EMPTY },
            1000,
            1050,
        );
        assert_eq!(*activations.lock(), vec![1000]);
        assert_eq!(session.state().totem.last_totem_use, Some(1000));

        inbound(&mut session, click(offhand, ItemStack::totem(), ItemStack::EMPTY), 1300);
        assert_eq!(*replenishes.lock(), vec![300]);
        assert_eq!(session.state().totem.last_totem_use, None);
        assert_eq!(session.state().totem.last_intervals(5), vec![300]);
    }

    #[tokio::test]
    async fn test_click_rates_sampled_once_per_second() {
        let (mut session, _sink) = session(ProtocolVersion::V1_20);
        session.on_login();
        let flying = ClientPacket::Flying { on_ground: true };

        let mut now = 0;
        for tick in 0..20 {
            if tick < 7 {
                inbound(&mut session, attack(), now);
            }
            if tick % 10 == 0 {
                inbound(&mut session, ClientPacket::UseItem { hand: Hand::MainHand }, now);
            }
            if tick == 19 {
                assert_eq!((session.clicks().left_cps(), session.clicks().right_cps()), (0, 0));
            }
            now += 50;
            inbound(&mut session, flying.clone(), now);
        }

        let clicks = session.clicks();
        assert_eq!(clicks.left_cps(), 7);
        assert_eq!(clicks.right_cps(), 2);
        assert!(!clicks.cps_updated(), "cleared once checks have run");

        // The sample holds until the next twenty ticks complete.
        inbound(&mut session, attack(), now);
        inbound(&mut session, flying, now + 50);
        assert_eq!(session.clicks().left_cps(), 7);
    }
}
