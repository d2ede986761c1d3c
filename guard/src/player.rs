//! Per-connection state derived from the packet stream.

use crate::inventory::ShadowInventory;
use log::debug;
use protocol::GameMode;
use std::collections::VecDeque;

/// Long-lived player flags tracked from both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub game_mode: GameMode,
    pub health: f32,
    pub food: i32,
    pub saturation: f32,
    pub sprinting: bool,
    pub sneaking: bool,
    pub can_fly: bool,
    pub flying: bool,
    open_inventory: bool,
}

impl Default for Data {
    fn default() -> Self {
        Self {
            game_mode: GameMode::Survival,
            health: 20.0,
            food: 20,
            saturation: 5.0,
            sprinting: false,
            sneaking: false,
            can_fly: false,
            flying: false,
            open_inventory: false,
        }
    }
}

impl Data {
    pub fn open_inventory(&self) -> bool {
        self.open_inventory
    }

    pub fn set_open_inventory(&mut self, open: bool) {
        if self.open_inventory != open {
            debug!("Inventory {}", if open { "opened" } else { "closed" });
        }
        self.open_inventory = open;
    }
}

/// Flags that only hold for the current client tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickData {
    pub swapping: bool,
    pub dropping: bool,
    pub interacting: bool,
    pub attacking: bool,
    pub releasing: bool,
    pub digging: bool,
    pub placing: bool,
    pub using: bool,
    pub clicking_in_inventory: bool,
    pub closing_inventory: bool,
    pub quick_move_clicking: bool,
    pub pick_up_clicking: bool,
}

impl TickData {
    pub fn reset(&mut self) {
        *self = TickData::default();
    }
}

const TICKS_PER_SAMPLE: u32 = 20;

/// Clicks per second, sampled every 20 client ticks.
///
/// Attacks and started digs count as left clicks, placements and item uses
/// as right clicks. The last completed sample stays readable through
/// [`Session::clicks`](crate::session::Session::clicks) until the next one
/// replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickData {
    ticks: u32,
    cps_updated: bool,
    left_cps: u32,
    right_cps: u32,
    left_clicks: u32,
    right_clicks: u32,
}

impl ClickData {
    pub fn record_left_click(&mut self) {
        self.left_clicks += 1;
    }

    pub fn record_right_click(&mut self) {
        self.right_clicks += 1;
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
        if self.ticks < TICKS_PER_SAMPLE {
            return;
        }

        self.cps_updated = true;
        self.left_cps = self.left_clicks;
        self.right_cps = self.right_clicks;
        self.ticks = 0;
        self.left_clicks = 0;
        self.right_clicks = 0;
    }

    /// Clears the "just sampled" marker once checks have seen it.
    pub fn check_post(&mut self) {
        self.cps_updated = false;
    }

    /// True only while the packet that completed a sample is being checked.
    pub fn cps_updated(&self) -> bool {
        self.cps_updated
    }

    pub fn left_cps(&self) -> u32 {
        self.left_cps
    }

    pub fn right_cps(&self) -> u32 {
        self.right_cps
    }
}

const MAX_INTERVALS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TotemData {
    /// Time the last totem popped, cleared once it is replenished.
    pub last_totem_use: Option<u64>,
    intervals: VecDeque<u64>,
}

impl TotemData {
    pub fn record_interval(&mut self, interval: u64) {
        if self.intervals.len() == MAX_INTERVALS {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    /// Up to `n` most recent replenish intervals, oldest first.
    pub fn last_intervals(&self, n: usize) -> Vec<u64> {
        let skip = self.intervals.len().saturating_sub(n);
        self.intervals.iter().skip(skip).copied().collect()
    }
}

/// Everything the processors and checks of one session read and write.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub inventory: ShadowInventory,
    pub data: Data,
    pub tick: TickData,
    pub clicks: ClickData,
    pub totem: TotemData,
    pub brand: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cps_sampled_every_twenty_ticks() {
        let mut clicks = ClickData::default();
        for _ in 0..7 {
            clicks.record_left_click();
        }
        clicks.record_right_click();

        for _ in 0..19 {
            clicks.tick();
        }
        assert!(!clicks.cps_updated());

        clicks.tick();
        assert!(clicks.cps_updated());
        assert_eq!(clicks.left_cps(), 7);
        assert_eq!(clicks.right_cps(), 1);

        clicks.check_post();
        assert!(!clicks.cps_updated());
    }

    #[test]
    fn test_tick_reset() {
        let mut tick = TickData {
            attacking: true,
            placing: true,
            ..Default::default()
        };
        tick.reset();
        assert_eq!(tick, TickData::default());
    }

    #[test]
    fn test_interval_window() {
        let mut totem = TotemData::default();
        for i in 0..25 {
            totem.record_interval(i);
        }
        assert_eq!(totem.last_intervals(3), vec![22, 23, 24]);
        assert_eq!(totem.last_intervals(100).len(), MAX_INTERVALS);
    }
}
