use super::{
    Capabilities, Check, CheckCategory, CheckContext, CheckCore, CheckDescriptor, Requirement,
};
use crate::config::GuardConfig;
use crate::player::TickData;
use protocol::{ClientPacket, InboundPacket, InteractAction};

pub(crate) static PROTOCOL_A: CheckDescriptor = CheckDescriptor {
    name: "ProtocolA",
    description: "Impossible action combination",
    category: CheckCategory::Protocol,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::ClientTickEnd,
};

pub(crate) static PROTOCOL_B: CheckDescriptor = CheckDescriptor {
    name: "ProtocolB",
    description: "Attacked multiple entities in the same tick",
    category: CheckCategory::Protocol,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

pub(crate) static PROTOCOL_C: CheckDescriptor = CheckDescriptor {
    name: "ProtocolC",
    description: "Invalid set slot",
    category: CheckCategory::Protocol,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::ClientTickEnd,
};

pub(crate) static PROTOCOL_D: CheckDescriptor = CheckDescriptor {
    name: "ProtocolD",
    description: "Sprinting while hungry",
    category: CheckCategory::Protocol,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

struct Combination {
    name: &'static str,
    /// Only impossible while the inventory screen is open; the client
    /// closes it without delay.
    needs_open_inventory: bool,
    matches: fn(&TickData) -> bool,
}

const COMBINATIONS: &[Combination] = &[
    Combination {
        name: "attack + place",
        needs_open_inventory: false,
        matches: |t| t.attacking && t.placing && !t.interacting,
    },
    Combination {
        name: "inventory_click + place",
        needs_open_inventory: true,
        matches: |t| t.clicking_in_inventory && t.placing,
    },
    Combination {
        name: "inventory_click + attack",
        needs_open_inventory: true,
        matches: |t| t.clicking_in_inventory && t.attacking,
    },
    Combination {
        name: "quickmove + attack",
        needs_open_inventory: true,
        matches: |t| t.quick_move_clicking && t.attacking,
    },
    Combination {
        name: "pickup_click + place",
        needs_open_inventory: true,
        matches: |t| t.pick_up_clicking && t.placing,
    },
];

/// Evaluates the actions of a whole tick when it ends.
pub struct ProtocolA {
    core: CheckCore,
}

impl ProtocolA {
    pub fn new() -> Self {
        Self {
            core: CheckCore::new(&PROTOCOL_A),
        }
    }
}

impl Default for ProtocolA {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for ProtocolA {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        if !ctx.is_tick_end(&packet.packet) {
            return;
        }

        let open_inventory = ctx.state.data.open_inventory();
        let hits: Vec<&'static str> = COMBINATIONS
            .iter()
            .filter(|c| !c.needs_open_inventory || open_inventory)
            .filter(|c| (c.matches)(&ctx.state.tick))
            .map(|c| c.name)
            .collect();

        for name in hits {
            ctx.fail(&mut self.core, Some(name.into()));
        }
    }
}

pub struct ProtocolB {
    core: CheckCore,
    last_target: i32,
    attacks: u32,
}

impl ProtocolB {
    pub fn new() -> Self {
        Self {
            core: CheckCore::new(&PROTOCOL_B),
            last_target: 0,
            attacks: 0,
        }
    }
}

impl Default for ProtocolB {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for ProtocolB {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        match &packet.packet {
            ClientPacket::InteractEntity {
                entity_id,
                action: InteractAction::Attack,
            } => {
                if *entity_id != self.last_target {
                    self.attacks += 1;
                    if self.attacks > 1 {
                        ctx.fail(&mut self.core, Some(format!("attacks: {}", self.attacks)));
                    }
                }
                self.last_target = *entity_id;
            }
            other if ctx.is_tick_end(other) => self.attacks = 0,
            _ => {}
        }
    }
}

/// Switching hotbar slots more than once between two placements of the
/// same tick.
pub struct ProtocolC {
    core: CheckCore,
    current_slot: Option<i32>,
    slot_changes: u32,
    placements: u32,
}

impl ProtocolC {
    pub fn new() -> Self {
        Self {
            core: CheckCore::new(&PROTOCOL_C),
            current_slot: None,
            slot_changes: 0,
            placements: 0,
        }
    }
}

impl Default for ProtocolC {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for ProtocolC {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        match &packet.packet {
            ClientPacket::HeldItemChange { slot } => {
                if self.current_slot.is_some_and(|current| current != *slot) {
                    self.slot_changes += 1;
                }
                self.current_slot = Some(*slot);
            }
            ClientPacket::BlockPlacement { .. } => {
                self.placements += 1;
                if self.placements > 1 && self.slot_changes > 1 {
                    ctx.fail(&mut self.core, None);
                }
            }
            other if ctx.is_tick_end(other) => {
                self.slot_changes = 0;
                self.placements = 0;
            }
            _ => {}
        }
    }
}

pub struct ProtocolD {
    core: CheckCore,
    food_threshold: i32,
}

impl ProtocolD {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            core: CheckCore::new(&PROTOCOL_D),
            food_threshold: config.hunger_sprint_threshold,
        }
    }
}

impl Check for ProtocolD {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        if !packet.packet.is_flying() {
            return;
        }
        let data = &ctx.state.data;
        if data.can_fly {
            return;
        }

        if data.food < self.food_threshold && data.sprinting {
            let food = data.food;
            ctx.fail(&mut self.core, Some(format!("hunger: {}", food)));
        }
    }
}
