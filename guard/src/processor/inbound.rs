use super::{InboundProcessor, ProcessorContext};
use crate::inventory::{Issuer, SlotAction};
use crate::latency::probe_response_id;
use log::debug;
use protocol::{
    ClickType, ClientPacket, DiggingAction, EntityActionKind, Hand, InboundPacket, InteractAction,
    PLAYER_WINDOW_ID, SLOT_OFFHAND,
};

/// Routes probe responses to the latency correlator and runs the callbacks
/// they release.
pub struct LatencyAckProcessor;

impl InboundProcessor for LatencyAckProcessor {
    fn handle_inbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut InboundPacket) {
        let Some(id) = probe_response_id(&packet.packet) else {
            return;
        };
        let Some(ack) = ctx.latency.acknowledge(id, packet.timestamp) else {
            return;
        };

        ack.run(ctx.state);

        // Our own confirmations must not reach the game server.
        if matches!(packet.packet, ClientPacket::WindowConfirmation { .. }) {
            packet.set_cancelled(true);
        }
    }
}

/// Applies client-claimed inventory changes to the shadow inventory.
pub struct InboundInventoryProcessor;

impl InboundProcessor for InboundInventoryProcessor {
    fn handle_inbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut InboundPacket) {
        if packet.is_cancelled() {
            return;
        }
        let timestamp = packet.timestamp;
        let inventory = &mut ctx.state.inventory;

        match &packet.packet {
            ClientPacket::UseItem { hand } => {
                let used_slot = match hand {
                    Hand::MainHand => inventory.main_hand_slot() as i32,
                    Hand::OffHand => SLOT_OFFHAND as i32,
                };
                let used = inventory.item(used_slot);
                let Some(equipment) = used.item.equipment_slot() else {
                    return;
                };
                let target = equipment.container_slot() as i32;
                let equipped = inventory.item(target);

                if !ctx.version.swaps_occupied_armor() && !equipped.is_empty() {
                    return;
                }

                inventory.set_item(used_slot, equipped, Issuer::Client, SlotAction::Swap, timestamp);
                inventory.set_item(target, used, Issuer::Client, SlotAction::Swap, timestamp);
            }
            ClientPacket::PlayerDigging { action } => {
                let main_hand = inventory.main_hand_slot() as i32;
                match action {
                    DiggingAction::DropItemStack => inventory.drop_item(main_hand, None, timestamp),
                    DiggingAction::DropItem => inventory.drop_item(main_hand, Some(1), timestamp),
                    DiggingAction::SwapItemWithOffhand => {
                        inventory.swap_main_hand_to_offhand(Issuer::Client, timestamp)
                    }
                    _ => {}
                }
            }
            ClientPacket::HeldItemChange { slot } => {
                inventory.select_hotbar(*slot);
            }
            ClientPacket::CreativeInventoryAction { slot, item } => {
                let upper = if ctx.version.has_offhand() { 45 } else { 44 };
                if (1..=upper).contains(slot) {
                    inventory.set_item(*slot, *item, Issuer::Client, SlotAction::Click, timestamp);
                }
            }
            ClientPacket::ClickWindow {
                window_id,
                slot,
                changed_slots,
                carried,
                ..
            } => {
                if *window_id != PLAYER_WINDOW_ID {
                    return;
                }
                inventory.set_carried(*carried, *slot, Issuer::Client, timestamp);
                for (changed, item) in changed_slots.iter().flatten() {
                    inventory.set_item(*changed, *item, Issuer::Client, SlotAction::Click, timestamp);
                }
            }
            _ => {}
        }
    }
}

/// Tracks movement flags, inventory visibility, per-tick actions and clicks.
pub struct InboundActionProcessor;

impl InboundProcessor for InboundActionProcessor {
    fn handle_inbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut InboundPacket) {
        let tick_end = ctx.is_tick_end(&packet.packet);
        let state = &mut *ctx.state;

        match &packet.packet {
            ClientPacket::InteractEntity { action, .. } => match action {
                InteractAction::Attack => {
                    state.tick.attacking = true;
                    state.clicks.record_left_click();
                }
                InteractAction::Interact | InteractAction::InteractAt => {
                    state.tick.interacting = true;
                }
            },
            ClientPacket::BlockPlacement { .. } => {
                state.tick.placing = true;
                state.clicks.record_right_click();
            }
            ClientPacket::UseItem { .. } => {
                state.tick.using = true;
                state.clicks.record_right_click();
            }
            ClientPacket::PlayerDigging { action } => match action {
                DiggingAction::StartDigging => {
                    state.tick.digging = true;
                    state.clicks.record_left_click();
                }
                DiggingAction::DropItem | DiggingAction::DropItemStack => state.tick.dropping = true,
                DiggingAction::SwapItemWithOffhand => state.tick.swapping = true,
                DiggingAction::ReleaseUseItem => state.tick.releasing = true,
                DiggingAction::CancelledDigging | DiggingAction::FinishedDigging => {}
            },
            ClientPacket::EntityAction { action } => match action {
                EntityActionKind::StartSneaking => state.data.sneaking = true,
                EntityActionKind::StopSneaking => state.data.sneaking = false,
                EntityActionKind::StartSprinting => state.data.sprinting = true,
                EntityActionKind::StopSprinting => state.data.sprinting = false,
                EntityActionKind::Other => {}
            },
            ClientPacket::PlayerInput { sneaking } => {
                if ctx.version.reports_sneak_in_input() {
                    state.data.sneaking = *sneaking;
                }
            }
            ClientPacket::PlayerAbilities { flying } => {
                state.data.flying = *flying && state.data.can_fly;
            }
            ClientPacket::ClickWindow {
                window_id,
                click_type,
                ..
            } => {
                state.tick.clicking_in_inventory = true;
                match click_type {
                    ClickType::QuickMove => state.tick.quick_move_clicking = true,
                    ClickType::Pickup => state.tick.pick_up_clicking = true,
                    _ => {}
                }
                // The client never announces opening its own inventory; a
                // click in it is the first evidence.
                if *window_id == PLAYER_WINDOW_ID {
                    state.data.set_open_inventory(true);
                }
            }
            ClientPacket::CloseWindow { .. } => {
                state.tick.closing_inventory = true;
                state.data.set_open_inventory(false);
            }
            _ => {}
        }

        if tick_end {
            state.clicks.tick();
        }
    }

    fn handle_inbound_post(&mut self, ctx: &mut ProcessorContext<'_>, packet: &InboundPacket) {
        ctx.state.clicks.check_post();
        if ctx.is_tick_end(&packet.packet) {
            ctx.state.tick.reset();
        }
    }
}

const MAX_BRAND_BYTES: usize = 64;

/// Records the client brand announced on the brand channel.
#[derive(Debug, Default)]
pub struct ClientBrandProcessor {
    has_brand: bool,
}

impl InboundProcessor for ClientBrandProcessor {
    fn handle_inbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut InboundPacket) {
        let ClientPacket::PluginMessage { channel, data } = &packet.packet else {
            return;
        };
        if channel != ctx.version.brand_channel() {
            return;
        }

        if data.is_empty() || data.len() > MAX_BRAND_BYTES {
            ctx.state.brand = Some(format!("sent {} bytes as brand", data.len()));
        } else if !self.has_brand {
            // First byte is the string length prefix.
            let brand = String::from_utf8_lossy(&data[1..]).replace(" (Velocity)", "");
            let brand = strip_color(&brand);
            debug!("{} is using {}", ctx.player, brand);
            ctx.state.brand = Some(brand);
        }
        self.has_brand = true;
    }
}

/// Removes legacy `§x` formatting codes.
fn strip_color(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
