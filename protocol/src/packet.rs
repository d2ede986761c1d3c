use crate::ItemStack;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClickType {
    Pickup,
    QuickMove,
    Swap,
    Clone,
    Throw,
    QuickCraft,
    PickupAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiggingAction {
    StartDigging,
    CancelledDigging,
    FinishedDigging,
    DropItemStack,
    DropItem,
    ReleaseUseItem,
    SwapItemWithOffhand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractAction {
    Attack,
    Interact,
    InteractAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityActionKind {
    StartSneaking,
    StopSneaking,
    StartSprinting,
    StopSprinting,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    MainHand,
    OffHand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Packets sent from the client to the server, already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientPacket {
    ClickWindow {
        window_id: i32,
        slot: i32,
        button: i32,
        click_type: ClickType,
        /// Slots the client claims changed; `None` on versions that do not
        /// report them.
        changed_slots: Option<Vec<(i32, ItemStack)>>,
        carried: ItemStack,
    },
    CreativeInventoryAction {
        slot: i32,
        item: ItemStack,
    },
    HeldItemChange {
        slot: i32,
    },
    PlayerDigging {
        action: DiggingAction,
    },
    InteractEntity {
        entity_id: i32,
        action: InteractAction,
    },
    BlockPlacement {
        hand: Hand,
    },
    UseItem {
        hand: Hand,
    },
    EntityAction {
        action: EntityActionKind,
    },
    PlayerInput {
        sneaking: bool,
    },
    PlayerAbilities {
        flying: bool,
    },
    PluginMessage {
        channel: String,
        data: Vec<u8>,
    },
    WindowConfirmation {
        window_id: i32,
        action_id: i16,
        accepted: bool,
    },
    Pong {
        id: i32,
    },
    CloseWindow {
        window_id: i32,
    },
    /// Any of the movement packets (position, rotation, both, or ground flag).
    Flying {
        on_ground: bool,
    },
    ClientTickEnd,
    TeleportConfirm {
        teleport_id: i32,
    },
}

impl ClientPacket {
    pub fn name(&self) -> &'static str {
        match self {
            ClientPacket::ClickWindow { .. } => "click_window",
            ClientPacket::CreativeInventoryAction { .. } => "creative_inventory_action",
            ClientPacket::HeldItemChange { .. } => "held_item_change",
            ClientPacket::PlayerDigging { .. } => "player_digging",
            ClientPacket::InteractEntity { .. } => "interact_entity",
            ClientPacket::BlockPlacement { .. } => "block_placement",
            ClientPacket::UseItem { .. } => "use_item",
            ClientPacket::EntityAction { .. } => "entity_action",
            ClientPacket::PlayerInput { .. } => "player_input",
            ClientPacket::PlayerAbilities { .. } => "player_abilities",
            ClientPacket::PluginMessage { .. } => "plugin_message",
            ClientPacket::WindowConfirmation { .. } => "window_confirmation",
            ClientPacket::Pong { .. } => "pong",
            ClientPacket::CloseWindow { .. } => "close_window",
            ClientPacket::Flying { .. } => "flying",
            ClientPacket::ClientTickEnd => "client_tick_end",
            ClientPacket::TeleportConfirm { .. } => "teleport_confirm",
        }
    }

    pub fn is_flying(&self) -> bool {
        matches!(self, ClientPacket::Flying { .. })
    }
}

/// Packets sent from the server to the client, already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPacket {
    WindowItems {
        window_id: i32,
        items: Vec<ItemStack>,
        carried: Option<ItemStack>,
    },
    SetSlot {
        window_id: i32,
        slot: i32,
        item: ItemStack,
    },
    SetPlayerInventory {
        slot: i32,
        item: ItemStack,
    },
    SetCursorItem {
        item: ItemStack,
    },
    JoinGame {
        entity_id: i32,
        game_mode: GameMode,
    },
    Respawn {
        game_mode: GameMode,
    },
    UpdateHealth {
        health: f32,
        food: i32,
        saturation: f32,
    },
    PlayerAbilities {
        can_fly: bool,
        flying: bool,
    },
    Ping {
        id: i32,
    },
    WindowConfirmation {
        window_id: i32,
        action_id: i16,
        accepted: bool,
    },
    CloseWindow {
        window_id: i32,
    },
}

impl ServerPacket {
    pub fn name(&self) -> &'static str {
        match self {
            ServerPacket::WindowItems { .. } => "window_items",
            ServerPacket::SetSlot { .. } => "set_slot",
            ServerPacket::SetPlayerInventory { .. } => "set_player_inventory",
            ServerPacket::SetCursorItem { .. } => "set_cursor_item",
            ServerPacket::JoinGame { .. } => "join_game",
            ServerPacket::Respawn { .. } => "respawn",
            ServerPacket::UpdateHealth { .. } => "update_health",
            ServerPacket::PlayerAbilities { .. } => "player_abilities",
            ServerPacket::Ping { .. } => "ping",
            ServerPacket::WindowConfirmation { .. } => "window_confirmation",
            ServerPacket::CloseWindow { .. } => "close_window",
        }
    }
}

/// A decoded client packet with its receive timestamp (milliseconds).
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub packet: ClientPacket,
    pub timestamp: u64,
    cancelled: bool,
}

impl InboundPacket {
    pub fn new(packet: ClientPacket, timestamp: u64) -> Self {
        Self {
            packet,
            timestamp,
            cancelled: false,
        }
    }

    /// A cancelled packet is not forwarded to the game server.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

pub type FlushTask = Box<dyn FnOnce() + Send>;

/// A decoded server packet with its send timestamp (milliseconds).
///
/// Tasks registered through [`OutboundPacket::after_flush`] must be run by
/// the transport, in registration order, once the packet has been written.
pub struct OutboundPacket {
    pub packet: ServerPacket,
    pub timestamp: u64,
    cancelled: bool,
    after_flush: Vec<FlushTask>,
}

impl OutboundPacket {
    pub fn new(packet: ServerPacket, timestamp: u64) -> Self {
        Self {
            packet,
            timestamp,
            cancelled: false,
            after_flush: Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn after_flush(&mut self, task: impl FnOnce() + Send + 'static) {
        self.after_flush.push(Box::new(task));
    }

    pub fn take_after_flush(&mut self) -> Vec<FlushTask> {
        std::mem::take(&mut self.after_flush)
    }

    /// Runs every pending flush task. Called by the transport after the write.
    pub fn flushed(&mut self) {
        for task in self.take_after_flush() {
            task();
        }
    }
}

impl fmt::Debug for OutboundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundPacket")
            .field("packet", &self.packet)
            .field("timestamp", &self.timestamp)
            .field("cancelled", &self.cancelled)
            .field("after_flush", &self.after_flush.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("write failed: {0}")]
    Write(String),
}

/// Write side of a single player connection.
pub trait PacketSink: Send + Sync {
    fn send(&self, packet: ServerPacket) -> Result<(), TransportError>;
}
