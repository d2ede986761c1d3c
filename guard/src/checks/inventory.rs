use super::{
    Capabilities, Check, CheckCategory, CheckContext, CheckCore, CheckDescriptor, Requirement,
};
use crate::config::GuardConfig;
use protocol::{ClickType, ClientPacket, DiggingAction, InboundPacket, InteractAction};

pub(crate) static INVENTORY_A: CheckDescriptor = CheckDescriptor {
    name: "InventoryA",
    description: "Impossible action with open inventory",
    category: CheckCategory::Inventory,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

pub(crate) static INVENTORY_B: CheckDescriptor = CheckDescriptor {
    name: "InventoryB",
    description: "Impossible click time difference",
    category: CheckCategory::Inventory,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

pub(crate) static INVENTORY_C: CheckDescriptor = CheckDescriptor {
    name: "InventoryC",
    description: "Dropped an item from an empty slot while carrying one",
    category: CheckCategory::Inventory,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

/// Name of the action a legitimate client cannot perform while its own
/// inventory screen is open.
fn impossible_action(packet: &ClientPacket) -> Option<&'static str> {
    match packet {
        ClientPacket::InteractEntity {
            action: InteractAction::Attack,
            ..
        } => Some("attack"),
        ClientPacket::BlockPlacement { .. } => Some("place"),
        ClientPacket::PlayerDigging {
            action: DiggingAction::StartDigging,
        } => Some("break"),
        ClientPacket::PlayerInput { .. } => Some("move"),
        ClientPacket::HeldItemChange { .. } => Some("change slot"),
        _ => None,
    }
}

/// Flags world interaction while the inventory is open, and clicking in a
/// window while sprinting.
pub struct InventoryA {
    core: CheckCore,
}

impl InventoryA {
    pub fn new() -> Self {
        Self {
            core: CheckCore::new(&INVENTORY_A),
        }
    }
}

impl Default for InventoryA {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for InventoryA {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        if ctx.state.data.sprinting && matches!(packet.packet, ClientPacket::ClickWindow { .. }) {
            ctx.fail(&mut self.core, Some("sprinting".into()));
        }

        if !ctx.state.data.open_inventory() {
            return;
        }

        if let Some(action) = impossible_action(&packet.packet) {
            ctx.fail(&mut self.core, Some(action.into()));
            // Some clients never send the close packet after acting, so the
            // screen is considered closed from here on.
            ctx.state.data.set_open_inventory(false);
        }
    }
}

/// Pickup clicks on the same mouse button faster than a human can manage.
pub struct InventoryB {
    core: CheckCore,
    threshold_ms: u64,
    last_left: Option<u64>,
    last_right: Option<u64>,
}

impl InventoryB {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            core: CheckCore::new(&INVENTORY_B),
            threshold_ms: config.rapid_click_threshold_ms,
            last_left: None,
            last_right: None,
        }
    }
}

impl Check for InventoryB {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        let ClientPacket::ClickWindow {
            button,
            click_type: ClickType::Pickup,
            ..
        } = &packet.packet
        else {
            return;
        };

        let last = match *button {
            0 => &mut self.last_left,
            1 => &mut self.last_right,
            _ => return,
        };

        let now = packet.timestamp;
        let previous = last.replace(now);
        if let Some(previous) = previous {
            let diff = now.saturating_sub(previous);
            if diff < self.threshold_ms {
                ctx.fail(&mut self.core, Some(format!("diff: {}ms", diff)));
            }
        }
    }
}

/// A throw click that names no slot can only drop the carried item, which a
/// vanilla client never does through this packet shape.
pub struct InventoryC {
    core: CheckCore,
}

impl InventoryC {
    pub fn new() -> Self {
        Self {
            core: CheckCore::new(&INVENTORY_C),
        }
    }
}

impl Default for InventoryC {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for InventoryC {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        let ClientPacket::ClickWindow {
            click_type: ClickType::Throw,
            changed_slots: None,
            ..
        } = &packet.packet
        else {
            return;
        };

        if !ctx.state.inventory.carried().item().is_empty() {
            ctx.fail(&mut self.core, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{record_flags, CheckHarness};
    use super::*;
    use crate::inventory::Issuer;
    use protocol::{ItemStack, ProtocolVersion};

    fn pickup(button: i32) -> ClientPacket {
        ClientPacket::ClickWindow {
            window_id: 0,
            slot: 20,
            button,
            click_type: ClickType::Pickup,
            changed_slots: Some(Vec::new()),
            carried: ItemStack::EMPTY,
        }
    }

    #[test]
    fn test_attack_with_open_inventory_flags_and_closes() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut check = InventoryA::new();
        harness.state.data.set_open_inventory(true);

        harness.receive(
            &mut check,
            ClientPacket::InteractEntity {
                entity_id: 7,
                action: InteractAction::Attack,
            },
            100,
        );

        assert_eq!(check.core().violations(), 1);
        assert_eq!(*flags.lock(), vec![Some("attack".to_string())]);
        assert!(!harness.state.data.open_inventory());

        // Closed now, the next attack is legitimate.
        harness.receive(
            &mut check,
            ClientPacket::InteractEntity {
                entity_id: 7,
                action: InteractAction::Attack,
            },
            150,
        );
        assert_eq!(check.core().violations(), 1);
    }

    #[test]
    fn test_actions_with_closed_inventory_pass() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = InventoryA::new();

        harness.receive(&mut check, ClientPacket::HeldItemChange { slot: 3 }, 1);
        harness.receive(
            &mut check,
            ClientPacket::PlayerDigging {
                action: DiggingAction::StartDigging,
            },
            2,
        );
        assert_eq!(check.core().violations(), 0);
    }

    #[test]
    fn test_each_impossible_action_is_named() {
        assert_eq!(
            impossible_action(&ClientPacket::HeldItemChange { slot: 1 }),
            Some("change slot")
        );
        assert_eq!(
            impossible_action(&ClientPacket::BlockPlacement {
                hand: protocol::Hand::MainHand
            }),
            Some("place")
        );
        assert_eq!(
            impossible_action(&ClientPacket::PlayerDigging {
                action: DiggingAction::DropItem
            }),
            None
        );
        assert_eq!(
            impossible_action(&ClientPacket::PlayerInput { sneaking: false }),
            Some("move")
        );
    }

    #[test]
    fn test_clicking_while_sprinting() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut check = InventoryA::new();
        harness.state.data.sprinting = true;

        harness.receive(&mut check, pickup(0), 1);
        assert_eq!(*flags.lock(), vec![Some("sprinting".to_string())]);
    }

    #[test]
    fn test_rapid_pickup_clicks() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut check = InventoryB::new(&harness.config);

        harness.receive(&mut check, pickup(0), 1000);
        harness.receive(&mut check, pickup(0), 1003);
        harness.receive(&mut check, pickup(0), 1053);

        assert_eq!(check.core().violations(), 1);
        assert_eq!(*flags.lock(), vec![Some("diff: 3ms".to_string())]);
    }

    #[test]
    fn test_buttons_are_timed_separately() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = InventoryB::new(&harness.config);

        harness.receive(&mut check, pickup(0), 1000);
        harness.receive(&mut check, pickup(1), 1001);
        harness.receive(&mut check, pickup(2), 1002);
        assert_eq!(check.core().violations(), 0);

        harness.receive(&mut check, pickup(1), 1002);
        assert_eq!(check.core().violations(), 1);
    }

    #[test]
    fn test_throw_without_slots_while_carrying() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = InventoryC::new();
        let throw = ClientPacket::ClickWindow {
            window_id: 0,
            slot: -999,
            button: 0,
            click_type: ClickType::Throw,
            changed_slots: None,
            carried: ItemStack::EMPTY,
        };

        harness.receive(&mut check, throw.clone(), 1);
        assert_eq!(check.core().violations(), 0);

        harness
            .state
            .inventory
            .set_carried(ItemStack::totem(), 40, Issuer::Client, 2);
        harness.receive(&mut check, throw, 3);
        assert_eq!(check.core().violations(), 1);
    }
}
