use super::{Cancellable, Event};
use crate::inventory::{CarriedItem, InventorySlot, Issuer};
use protocol::PlayerId;

/// A session passed its exemption checks and is now being checked.
#[derive(Debug, Clone)]
pub struct UserJoinEvent {
    pub player: PlayerId,
    pub name: String,
}

impl UserJoinEvent {
    pub fn new(player: PlayerId, name: impl Into<String>) -> Self {
        Self {
            player,
            name: name.into(),
        }
    }
}

impl Event for UserJoinEvent {
    fn name(&self) -> &'static str {
        "UserJoinEvent"
    }
}

#[derive(Debug, Clone)]
pub struct UserQuitEvent {
    pub player: PlayerId,
    pub name: String,
}

impl UserQuitEvent {
    pub fn new(player: PlayerId, name: impl Into<String>) -> Self {
        Self {
            player,
            name: name.into(),
        }
    }
}

impl Event for UserQuitEvent {
    fn name(&self) -> &'static str {
        "UserQuitEvent"
    }
}

/// Raised by a check before a violation is counted. Cancelling it vetoes
/// the violation.
#[derive(Debug, Clone)]
pub struct FlagEvent {
    pub player: PlayerId,
    pub player_name: String,
    pub check: &'static str,
    /// Violation count before this flag.
    pub violations: u32,
    pub debug: Option<String>,
    cancelled: bool,
}

impl FlagEvent {
    pub fn new(
        player: PlayerId,
        player_name: impl Into<String>,
        check: &'static str,
        violations: u32,
        debug: Option<String>,
    ) -> Self {
        Self {
            player,
            player_name: player_name.into(),
            check,
            violations,
            debug,
            cancelled: false,
        }
    }
}

impl Cancellable for FlagEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Event for FlagEvent {
    fn name(&self) -> &'static str {
        "FlagEvent"
    }

    fn as_cancellable(&mut self) -> Option<&mut dyn Cancellable> {
        Some(self)
    }
}

/// Published right before an alert is broadcast. Handlers may rewrite the
/// message or cancel the broadcast.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub player: PlayerId,
    pub check: &'static str,
    pub violations: u32,
    pub message: String,
    cancelled: bool,
}

impl AlertEvent {
    pub fn new(player: PlayerId, check: &'static str, violations: u32, message: String) -> Self {
        Self {
            player,
            check,
            violations,
            message,
            cancelled: false,
        }
    }
}

impl Cancellable for AlertEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Event for AlertEvent {
    fn name(&self) -> &'static str {
        "AlertEvent"
    }

    fn as_cancellable(&mut self) -> Option<&mut dyn Cancellable> {
        Some(self)
    }
}

/// Every slot and carried-item change drained at the end of one read cycle.
#[derive(Debug, Clone)]
pub struct InventoryChangedEvent {
    pub player: PlayerId,
    pub changed_slots: Vec<InventorySlot>,
    pub carried: Option<CarriedItem>,
    pub last_issuer: Issuer,
}

impl Event for InventoryChangedEvent {
    fn name(&self) -> &'static str {
        "InventoryChangedEvent"
    }

    fn internal(&self) -> bool {
        true
    }
}

/// The server emptied a slot that held a totem.
#[derive(Debug, Clone, Copy)]
pub struct TotemActivatedEvent {
    pub player: PlayerId,
    pub timestamp: u64,
}

impl TotemActivatedEvent {
    pub fn new(player: PlayerId, timestamp: u64) -> Self {
        Self { player, timestamp }
    }
}

impl Event for TotemActivatedEvent {
    fn name(&self) -> &'static str {
        "TotemActivatedEvent"
    }

    fn internal(&self) -> bool {
        true
    }
}

/// A totem landed back in a hand slot after one was used.
#[derive(Debug, Clone, Copy)]
pub struct TotemReplenishedEvent {
    pub player: PlayerId,
    pub used_at: u64,
    pub replenished_at: u64,
}

impl TotemReplenishedEvent {
    pub fn interval(&self) -> u64 {
        self.replenished_at.saturating_sub(self.used_at)
    }
}

impl Event for TotemReplenishedEvent {
    fn name(&self) -> &'static str {
        "TotemReplenishedEvent"
    }

    fn internal(&self) -> bool {
        true
    }
}
