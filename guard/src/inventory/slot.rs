use protocol::ItemStack;

/// Party a state change is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Issuer {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotAction {
    Irrelevant,
    Click,
    Swap,
    Drop,
    Resync,
}

/// What a slot held before its latest update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotState {
    pub item: ItemStack,
    pub issuer: Issuer,
    pub action: SlotAction,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InventorySlot {
    index: usize,
    item: ItemStack,
    issuer: Issuer,
    action: SlotAction,
    updated_at: u64,
    previous: SlotState,
    updated: bool,
}

impl InventorySlot {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            item: ItemStack::EMPTY,
            issuer: Issuer::Server,
            action: SlotAction::Irrelevant,
            updated_at: 0,
            previous: SlotState {
                item: ItemStack::EMPTY,
                issuer: Issuer::Server,
                action: SlotAction::Irrelevant,
                timestamp: 0,
            },
            updated: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item(&self) -> ItemStack {
        self.item
    }

    pub fn issuer(&self) -> Issuer {
        self.issuer
    }

    pub fn action(&self) -> SlotAction {
        self.action
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn previous(&self) -> &SlotState {
        &self.previous
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Returns true when the slot was not already marked as updated.
    pub(crate) fn update(
        &mut self,
        item: ItemStack,
        issuer: Issuer,
        action: SlotAction,
        timestamp: u64,
    ) -> bool {
        self.previous = SlotState {
            item: self.item,
            issuer: self.issuer,
            action: self.action,
            timestamp: self.updated_at,
        };
        self.item = item;
        self.issuer = issuer;
        self.action = action;
        self.updated_at = timestamp;

        !std::mem::replace(&mut self.updated, true)
    }

    pub(crate) fn clear_updated(&mut self) {
        self.updated = false;
    }
}

/// Item held on the cursor while a container is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarriedItem {
    item: ItemStack,
    origin_slot: i32,
    issuer: Issuer,
    timestamp: u64,
    previous: SlotState,
    updated: bool,
}

impl CarriedItem {
    pub(crate) fn new() -> Self {
        Self {
            item: ItemStack::EMPTY,
            origin_slot: -1,
            issuer: Issuer::Server,
            timestamp: 0,
            previous: SlotState {
                item: ItemStack::EMPTY,
                issuer: Issuer::Server,
                action: SlotAction::Irrelevant,
                timestamp: 0,
            },
            updated: false,
        }
    }

    pub fn item(&self) -> ItemStack {
        self.item
    }

    /// Window slot the click that produced this item targeted, -1 if unknown.
    pub fn origin_slot(&self) -> i32 {
        self.origin_slot
    }

    pub fn issuer(&self) -> Issuer {
        self.issuer
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn previous(&self) -> &SlotState {
        &self.previous
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// No-op when the item is unchanged.
    pub(crate) fn update(&mut self, item: ItemStack, origin_slot: i32, issuer: Issuer, timestamp: u64) {
        if item == self.item {
            return;
        }

        self.previous = SlotState {
            item: self.item,
            issuer: self.issuer,
            action: SlotAction::Irrelevant,
            timestamp: self.timestamp,
        };
        self.item = item;
        self.origin_slot = origin_slot;
        self.issuer = issuer;
        self.timestamp = timestamp;
        self.updated = true;
    }

    pub(crate) fn clear_updated(&mut self) {
        self.updated = false;
    }
}
