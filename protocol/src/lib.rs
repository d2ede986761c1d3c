//! Decoded packet boundary shared by the detection engine and its host.
//!
//! Nothing in here touches the wire. The host's protocol layer decodes
//! frames into [`ClientPacket`] / [`ServerPacket`] values, stamps them with a
//! monotonic millisecond timestamp and hands them over as
//! [`InboundPacket`] / [`OutboundPacket`].

pub mod capture;
pub mod packet;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use capture::{Capture, CaptureRecord};
pub use packet::{
    ClickType, ClientPacket, DiggingAction, EntityActionKind, GameMode, Hand, InboundPacket,
    InteractAction, OutboundPacket, PacketSink, ServerPacket, TransportError,
};

/// Stable identity of a connected player.
pub type PlayerId = Uuid;

pub const PLAYER_WINDOW_ID: i32 = 0;
pub const INVENTORY_SIZE: usize = 46;

pub const SLOT_CRAFT_RESULT: usize = 0;
pub const SLOT_HELMET: usize = 5;
pub const SLOT_CHESTPLATE: usize = 6;
pub const SLOT_LEGGINGS: usize = 7;
pub const SLOT_BOOTS: usize = 8;
pub const ITEMS_START: usize = 9;
pub const ITEMS_END: usize = 35;
pub const HOTBAR_START: usize = 36;
pub const HOTBAR_END: usize = 44;
pub const SLOT_OFFHAND: usize = 45;

/// Item kinds the engine reasons about. Everything else is carried as an
/// opaque registry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Air,
    TotemOfUndying,
    Helmet,
    Chestplate,
    Leggings,
    Boots,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentSlot {
    Head,
    Chest,
    Legs,
    Feet,
}

impl EquipmentSlot {
    /// Player window slot backing this equipment slot.
    pub fn container_slot(self) -> usize {
        match self {
            EquipmentSlot::Head => SLOT_HELMET,
            EquipmentSlot::Chest => SLOT_CHESTPLATE,
            EquipmentSlot::Legs => SLOT_LEGGINGS,
            EquipmentSlot::Feet => SLOT_BOOTS,
        }
    }
}

impl ItemType {
    pub fn equipment_slot(self) -> Option<EquipmentSlot> {
        match self {
            ItemType::Helmet => Some(EquipmentSlot::Head),
            ItemType::Chestplate => Some(EquipmentSlot::Chest),
            ItemType::Leggings => Some(EquipmentSlot::Legs),
            ItemType::Boots => Some(EquipmentSlot::Feet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemType,
    pub amount: u32,
}

impl ItemStack {
    pub const EMPTY: ItemStack = ItemStack {
        item: ItemType::Air,
        amount: 0,
    };

    pub fn new(item: ItemType, amount: u32) -> Self {
        if item == ItemType::Air || amount == 0 {
            return Self::EMPTY;
        }
        Self { item, amount }
    }

    pub fn totem() -> Self {
        Self::new(ItemType::TotemOfUndying, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.item == ItemType::Air || self.amount == 0
    }

    pub fn is(&self, item: ItemType) -> bool {
        !self.is_empty() && self.item == item
    }

    pub fn is_totem(&self) -> bool {
        self.is(ItemType::TotemOfUndying)
    }

    /// Returns the stack left behind after removing `amount` items.
    pub fn shrink(&self, amount: u32) -> ItemStack {
        if self.amount <= amount {
            ItemStack::EMPTY
        } else {
            ItemStack::new(self.item, self.amount - amount)
        }
    }
}

impl Default for ItemStack {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Negotiated protocol version of a client connection.
///
/// Capability predicates are evaluated once per session; the engine never
/// inspects raw version numbers outside this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    pub const V1_8: ProtocolVersion = ProtocolVersion(47);
    pub const V1_9: ProtocolVersion = ProtocolVersion(107);
    pub const V1_13: ProtocolVersion = ProtocolVersion(393);
    pub const V1_16: ProtocolVersion = ProtocolVersion(735);
    pub const V1_17: ProtocolVersion = ProtocolVersion(755);
    pub const V1_19_4: ProtocolVersion = ProtocolVersion(762);
    pub const V1_20: ProtocolVersion = ProtocolVersion(763);
    pub const V1_21_2: ProtocolVersion = ProtocolVersion(768);
    pub const V1_21_6: ProtocolVersion = ProtocolVersion(771);

    pub fn is_at_least(self, other: ProtocolVersion) -> bool {
        self >= other
    }

    /// Round-trip probes use ping/pong instead of window confirmations.
    pub fn uses_ping_probes(self) -> bool {
        self.is_at_least(Self::V1_17)
    }

    /// The client reports the end of every tick explicitly.
    pub fn has_client_tick_end(self) -> bool {
        self.is_at_least(Self::V1_21_2)
    }

    pub fn has_offhand(self) -> bool {
        self.is_at_least(Self::V1_9)
    }

    /// Player-input packets carry the sneak key state.
    pub fn reports_sneak_in_input(self) -> bool {
        self.is_at_least(Self::V1_21_6)
    }

    /// Armor can be swapped onto an occupied equipment slot by using it.
    pub fn swaps_occupied_armor(self) -> bool {
        self.is_at_least(Self::V1_19_4)
    }

    pub fn brand_channel(self) -> &'static str {
        if self.is_at_least(Self::V1_13) {
            "minecraft:brand"
        } else {
            "MC|Brand"
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol {}", self.0)
    }
}
