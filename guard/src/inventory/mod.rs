//! Server-side mirror of the player window.
//!
//! Both the server (window items, set slot, cursor) and the client (clicks,
//! drops, swaps) mutate the mirror. Each mutation records who made it and
//! when, and marks the slot as updated. The session drains the updates once
//! per read cycle with [`ShadowInventory::take_updated_slots`] and
//! [`ShadowInventory::take_updated_carried`]; nothing else may drain them.

mod slot;

pub use slot::{CarriedItem, InventorySlot, Issuer, SlotAction, SlotState};

use protocol::{ItemStack, HOTBAR_START, INVENTORY_SIZE, SLOT_OFFHAND};

#[derive(Debug, Clone)]
pub struct ShadowInventory {
    slots: [InventorySlot; INVENTORY_SIZE],
    selected_hotbar: usize,
    carried: CarriedItem,
    /// Updated slot indexes in first-mutation order.
    pending: Vec<usize>,
    last_issuer: Issuer,
}

fn slot_index(slot: i32) -> Option<usize> {
    usize::try_from(slot).ok().filter(|&index| index < INVENTORY_SIZE)
}

impl ShadowInventory {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(InventorySlot::new),
            selected_hotbar: 0,
            carried: CarriedItem::new(),
            pending: Vec::new(),
            last_issuer: Issuer::Server,
        }
    }

    /// Out-of-range slots are ignored.
    pub fn set_item(
        &mut self,
        slot: i32,
        item: ItemStack,
        issuer: Issuer,
        action: SlotAction,
        timestamp: u64,
    ) {
        let Some(index) = slot_index(slot) else {
            return;
        };
        if self.slots[index].update(item, issuer, action, timestamp) {
            self.pending.push(index);
        }
        self.last_issuer = issuer;
    }

    /// Drops the whole stack, or `amount` items of it.
    pub fn drop_item(&mut self, slot: i32, amount: Option<u32>, timestamp: u64) {
        let Some(index) = slot_index(slot) else {
            return;
        };
        let current = self.slots[index].item();
        let remaining = match amount {
            Some(amount) => current.shrink(amount),
            None => ItemStack::EMPTY,
        };
        self.set_item(slot, remaining, Issuer::Client, SlotAction::Drop, timestamp);
    }

    pub fn set_carried(&mut self, item: ItemStack, origin_slot: i32, issuer: Issuer, timestamp: u64) {
        self.carried.update(item, origin_slot, issuer, timestamp);
        if self.carried.is_updated() {
            self.last_issuer = issuer;
        }
    }

    pub fn swap_main_hand_to_offhand(&mut self, issuer: Issuer, timestamp: u64) {
        let main_slot = self.main_hand_slot() as i32;
        let main = self.main_hand();
        let off = self.off_hand();

        self.set_item(main_slot, off, issuer, SlotAction::Swap, timestamp);
        self.set_item(SLOT_OFFHAND as i32, main, issuer, SlotAction::Swap, timestamp);
    }

    /// Replaces the whole window with server contents.
    pub fn resync(&mut self, items: &[ItemStack], carried: Option<ItemStack>, timestamp: u64) {
        for index in 0..INVENTORY_SIZE {
            let item = items.get(index).copied().unwrap_or(ItemStack::EMPTY);
            self.set_item(index as i32, item, Issuer::Server, SlotAction::Resync, timestamp);
        }
        self.set_carried(carried.unwrap_or(ItemStack::EMPTY), -1, Issuer::Server, timestamp);
    }

    /// Returns false for indexes outside the hotbar.
    pub fn select_hotbar(&mut self, index: i32) -> bool {
        match usize::try_from(index) {
            Ok(index) if index <= 8 => {
                self.selected_hotbar = index;
                true
            }
            _ => false,
        }
    }

    pub fn selected_hotbar(&self) -> usize {
        self.selected_hotbar
    }

    pub fn main_hand_slot(&self) -> usize {
        HOTBAR_START + self.selected_hotbar
    }

    pub fn is_hand_slot(&self, slot: i32) -> bool {
        slot_index(slot).is_some_and(|index| index == self.main_hand_slot() || index == SLOT_OFFHAND)
    }

    pub fn item(&self, slot: i32) -> ItemStack {
        slot_index(slot)
            .map(|index| self.slots[index].item())
            .unwrap_or(ItemStack::EMPTY)
    }

    pub fn slot(&self, slot: i32) -> Option<&InventorySlot> {
        slot_index(slot).map(|index| &self.slots[index])
    }

    pub fn main_hand(&self) -> ItemStack {
        self.slots[self.main_hand_slot()].item()
    }

    pub fn off_hand(&self) -> ItemStack {
        self.slots[SLOT_OFFHAND].item()
    }

    pub fn carried(&self) -> &CarriedItem {
        &self.carried
    }

    pub fn is_carrying_item(&self, predicate: impl Fn(&ItemStack) -> bool) -> bool {
        let item = self.carried.item();
        !item.is_empty() && predicate(&item)
    }

    pub fn is_totem_in_slot(&self, slot: i32) -> bool {
        self.item(slot).is_totem()
    }

    pub fn last_issuer(&self) -> Issuer {
        self.last_issuer
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending.is_empty() || self.carried.is_updated()
    }

    /// Drains the slots updated since the last call, each exactly once.
    pub fn take_updated_slots(&mut self) -> Vec<InventorySlot> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|index| {
                self.slots[index].clear_updated();
                self.slots[index]
            })
            .collect()
    }

    pub fn take_updated_carried(&mut self) -> Option<CarriedItem> {
        if !self.carried.is_updated() {
            return None;
        }
        self.carried.clear_updated();
        Some(self.carried)
    }
}

impl Default for ShadowInventory {
    fn default() -> Self {
        Self::new()
    }
}
