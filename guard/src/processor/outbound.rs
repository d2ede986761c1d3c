use super::{OutboundProcessor, ProcessorContext};
use crate::event::{InternalEvent, TotemActivatedEvent};
use crate::inventory::{Issuer, SlotAction};
use crate::latency::AckInfo;
use crate::player::PlayerState;
use protocol::{
    ItemStack, OutboundPacket, ProtocolVersion, ServerPacket, HOTBAR_START, PLAYER_WINDOW_ID,
    SLOT_BOOTS, SLOT_OFFHAND,
};

/// Maps a set-player-inventory index (hotbar 0-8, storage 9-35, armor
/// 36-39 boots first, offhand 40) onto the player window.
pub fn player_inventory_to_window_slot(slot: i32) -> Option<i32> {
    match slot {
        0..=8 => Some(HOTBAR_START as i32 + slot),
        9..=35 => Some(slot),
        36..=39 => Some(SLOT_BOOTS as i32 - (slot - 36)),
        40 => Some(SLOT_OFFHAND as i32),
        _ => None,
    }
}

/// Applies server inventory contents once the client has acknowledged a
/// probe sent after them, stamped with the acknowledgement time.
pub struct OutboundInventoryProcessor;

type Reconcile = Box<dyn FnOnce(&mut PlayerState, &AckInfo) + Send>;

impl OutboundProcessor for OutboundInventoryProcessor {
    fn handle_outbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut OutboundPacket) {
        if packet.is_cancelled() {
            return;
        }

        let reconcile: Reconcile = match &packet.packet {
            ServerPacket::WindowItems {
                window_id,
                items,
                carried,
            } if *window_id == PLAYER_WINDOW_ID => {
                let items = items.clone();
                let carried = *carried;
                Box::new(move |state, ack| state.inventory.resync(&items, carried, ack.acked_at))
            }
            ServerPacket::SetSlot { window_id: -1, slot: -1, item } => {
                let item = *item;
                Box::new(move |state, ack| {
                    state.inventory.set_carried(item, -1, Issuer::Server, ack.acked_at)
                })
            }
            ServerPacket::SetSlot { window_id, slot, item } if *window_id == PLAYER_WINDOW_ID => {
                let (slot, item) = (*slot, *item);
                Box::new(move |state, ack| set_server_slot(state, slot, item, ack))
            }
            ServerPacket::SetPlayerInventory { slot, item } => {
                let Some(slot) = player_inventory_to_window_slot(*slot) else {
                    return;
                };
                let item = *item;
                Box::new(move |state, ack| set_server_slot(state, slot, item, ack))
            }
            ServerPacket::SetCursorItem { item } => {
                let item = *item;
                Box::new(move |state, ack| {
                    state.inventory.set_carried(item, -1, Issuer::Server, ack.acked_at)
                })
            }
            _ => return,
        };

        ctx.latency.run_after_next_ack_following(packet, reconcile);
    }
}

fn set_server_slot(state: &mut PlayerState, slot: i32, item: ItemStack, ack: &AckInfo) {
    state
        .inventory
        .set_item(slot, item, Issuer::Server, SlotAction::Irrelevant, ack.acked_at);
}

/// Detects a totem being consumed: the server empties a slot that held one.
pub struct OutboundTotemProcessor;

impl OutboundProcessor for OutboundTotemProcessor {
    fn handle_outbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut OutboundPacket) {
        if packet.is_cancelled() {
            return;
        }
        let ServerPacket::SetSlot { window_id, slot, item } = &packet.packet else {
            return;
        };
        if *window_id != PLAYER_WINDOW_ID {
            return;
        }

        if item.is_empty() && ctx.state.inventory.is_totem_in_slot(*slot) {
            ctx.state.totem.last_totem_use = Some(packet.timestamp);
            ctx.emit(InternalEvent::TotemActivated(TotemActivatedEvent::new(
                ctx.player,
                packet.timestamp,
            )));
        }
    }
}

/// Health, game mode, abilities and server-side window closes.
pub struct OutboundStateProcessor;

impl OutboundProcessor for OutboundStateProcessor {
    fn handle_outbound(&mut self, ctx: &mut ProcessorContext<'_>, packet: &mut OutboundPacket) {
        if packet.is_cancelled() {
            return;
        }
        let data = &mut ctx.state.data;

        match &packet.packet {
            ServerPacket::UpdateHealth {
                health,
                food,
                saturation,
            } => {
                data.health = *health;
                data.food = *food;
                data.saturation = *saturation;
            }
            ServerPacket::JoinGame { game_mode, .. } => {
                data.game_mode = *game_mode;
            }
            ServerPacket::Respawn { game_mode } => {
                let version = ctx.version;
                if !version.is_at_least(ProtocolVersion::V1_16)
                    || version.is_at_least(ProtocolVersion::V1_20)
                {
                    data.sneaking = false;
                }
                data.sprinting = false;
                data.game_mode = *game_mode;
                data.set_open_inventory(false);
            }
            ServerPacket::PlayerAbilities { can_fly, flying } => {
                data.can_fly = *can_fly;
                data.flying = *flying;
            }
            ServerPacket::CloseWindow { .. } => {
                data.set_open_inventory(false);
            }
            _ => {}
        }
    }
}
