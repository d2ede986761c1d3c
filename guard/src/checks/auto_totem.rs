use super::{
    Capabilities, Check, CheckCategory, CheckContext, CheckCore, CheckDescriptor, Requirement,
};
use crate::config::GuardConfig;
use crate::event::{InventoryChangedEvent, InternalEvent};
use crate::inventory::Issuer;
use log::debug;

pub(crate) static AUTO_TOTEM_A: CheckDescriptor = CheckDescriptor {
    name: "AutoTotemA",
    description: "Impossible totem placement time after a pop",
    category: CheckCategory::AutoTotem,
    experimental: false,
    capabilities: Capabilities::EVENTS,
    requirement: Requirement::None,
};

pub(crate) static AUTO_TOTEM_B: CheckDescriptor = CheckDescriptor {
    name: "AutoTotemB",
    description: "Suspicious replenish delay consistency",
    category: CheckCategory::AutoTotem,
    experimental: true,
    capabilities: Capabilities::EVENTS,
    requirement: Requirement::None,
};

/// Sample standard deviation; zero for fewer than two samples.
pub fn standard_deviation(samples: &[u64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&s| (s as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}

/// Times how quickly a totem is picked up and dropped into a hand slot
/// after one was consumed.
pub struct AutoTotemA {
    core: CheckCore,
    max_click_ms: u64,
    max_use_ms: u64,
    activated_at: Option<u64>,
    picked_up_at: Option<u64>,
}

impl AutoTotemA {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            core: CheckCore::new(&AUTO_TOTEM_A),
            max_click_ms: config.auto_totem_click_ms,
            max_use_ms: config.auto_totem_use_window_ms,
            activated_at: None,
            picked_up_at: None,
        }
    }

    fn on_inventory_changed(&mut self, ctx: &mut CheckContext<'_>, event: &InventoryChangedEvent) {
        if event.last_issuer != Issuer::Client {
            return;
        }
        let Some(carried) = &event.carried else {
            return;
        };

        let was_carrying = carried.previous().item.is_totem();
        let carrying = ctx.state.inventory.carried().item().is_totem();
        let origin = carried.origin_slot();

        if !carrying && was_carrying {
            let inventory = &ctx.state.inventory;
            if inventory.is_hand_slot(origin) && inventory.is_totem_in_slot(origin) {
                if let (Some(picked_up_at), Some(activated_at)) =
                    (self.picked_up_at, self.activated_at)
                {
                    self.evaluate(ctx, carried.timestamp(), picked_up_at, activated_at);
                }
            }
        } else if carrying && !was_carrying {
            self.picked_up_at = Some(carried.timestamp());
        }
    }

    fn evaluate(&mut self, ctx: &CheckContext<'_>, now: u64, picked_up_at: u64, activated_at: u64) {
        let click_diff = now.abs_diff(picked_up_at);
        let use_diff = now.abs_diff(activated_at);

        if click_diff <= self.max_click_ms && use_diff <= self.max_use_ms {
            ctx.fail(
                &mut self.core,
                Some(format!(
                    "click time: {}ms, totemUseTimeDiff: {}ms",
                    click_diff, use_diff
                )),
            );
        }

        self.activated_at = None;
        self.picked_up_at = None;
    }
}

impl Check for AutoTotemA {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_event(&mut self, ctx: &mut CheckContext<'_>, event: &InternalEvent) {
        match event {
            InternalEvent::TotemActivated(activated) => {
                self.activated_at = Some(activated.timestamp);
            }
            InternalEvent::InventoryChanged(changed) => self.on_inventory_changed(ctx, changed),
            InternalEvent::TotemReplenished(_) => {}
        }
    }
}

/// Humans replenish with jittery delays; macros are metronomic.
pub struct AutoTotemB {
    core: CheckCore,
    samples: usize,
    min_std_dev_ms: f64,
}

impl AutoTotemB {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            core: CheckCore::new(&AUTO_TOTEM_B),
            samples: config.replenish_min_intervals,
            min_std_dev_ms: config.replenish_min_std_dev_ms,
        }
    }
}

impl Check for AutoTotemB {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_event(&mut self, ctx: &mut CheckContext<'_>, event: &InternalEvent) {
        let InternalEvent::TotemReplenished(_) = event else {
            return;
        };

        let intervals = ctx.state.totem.last_intervals(self.samples);
        if intervals.len() < self.samples {
            debug!(
                "{} skip: not enough delays ({}/{})",
                ctx.player_name,
                intervals.len(),
                self.samples
            );
            return;
        }

        let deviation = standard_deviation(&intervals);
        debug!("{} std dev {:.2} over {:?}", ctx.player_name, deviation, intervals);
        if deviation < self.min_std_dev_ms {
            ctx.fail(
                &mut self.core,
                Some(format!("std dev: {:.2}ms, samples: {:?}", deviation, intervals)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{record_flags, CheckHarness};
    use super::*;
    use crate::event::{TotemActivatedEvent, TotemReplenishedEvent};
    use crate::inventory::SlotAction;
    use assert_approx_eq::assert_approx_eq;
    use protocol::{ItemStack, ProtocolVersion, SLOT_OFFHAND};

    #[test]
    fn test_standard_deviation() {
        assert_approx_eq!(standard_deviation(&[2, 4, 4, 4, 5, 5, 7, 9]), 2.13809, 1e-5);
        assert_approx_eq!(standard_deviation(&[300, 300, 300]), 0.0);
        assert_approx_eq!(standard_deviation(&[42]), 0.0);
    }

    /// Simulates the client moving a totem from storage onto the cursor and
    /// then into the offhand, draining the inventory the way a session does.
    fn move_totem_to_offhand(
        harness: &mut CheckHarness,
        check: &mut AutoTotemA,
        picked_at: u64,
        placed_at: u64,
    ) {
        let inventory = &mut harness.state.inventory;
        inventory.set_item(20, ItemStack::EMPTY, Issuer::Client, SlotAction::Click, picked_at);
        inventory.set_carried(ItemStack::totem(), 20, Issuer::Client, picked_at);
        let event = changed(harness);
        harness.event(check, event);

        let offhand = SLOT_OFFHAND as i32;
        let inventory = &mut harness.state.inventory;
        inventory.set_item(offhand, ItemStack::totem(), Issuer::Client, SlotAction::Click, placed_at);
        inventory.set_carried(ItemStack::EMPTY, offhand, Issuer::Client, placed_at);
        let event = changed(harness);
        harness.event(check, event);
    }

    fn changed(harness: &mut CheckHarness) -> InternalEvent {
        let inventory = &mut harness.state.inventory;
        InternalEvent::InventoryChanged(InventoryChangedEvent {
            player: harness.player,
            changed_slots: inventory.take_updated_slots(),
            carried: inventory.take_updated_carried(),
            last_issuer: inventory.last_issuer(),
        })
    }

    #[test]
    fn test_fast_replacement_after_pop() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut check = AutoTotemA::new(&harness.config);

        let activated = TotemActivatedEvent::new(harness.player, 1000);
        harness.event(&mut check, InternalEvent::TotemActivated(activated));
        move_totem_to_offhand(&mut harness, &mut check, 1100, 1140);

        assert_eq!(
            *flags.lock(),
            vec![Some("click time: 40ms, totemUseTimeDiff: 140ms".to_string())]
        );
    }

    #[test]
    fn test_slow_replacement_passes() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = AutoTotemA::new(&harness.config);

        let activated = TotemActivatedEvent::new(harness.player, 1000);
        harness.event(&mut check, InternalEvent::TotemActivated(activated));
        move_totem_to_offhand(&mut harness, &mut check, 1100, 1300);
        assert_eq!(check.core().violations(), 0);

        // State was reset by the evaluation, a quick move without a new pop
        // is not judged.
        move_totem_to_offhand(&mut harness, &mut check, 2000, 2010);
        assert_eq!(check.core().violations(), 0);
    }

    #[test]
    fn test_no_pop_no_evaluation() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = AutoTotemA::new(&harness.config);
        move_totem_to_offhand(&mut harness, &mut check, 1100, 1110);
        assert_eq!(check.core().violations(), 0);
    }

    fn replenished(harness: &mut CheckHarness, check: &mut AutoTotemB, intervals: &[u64]) {
        for interval in intervals {
            harness.state.totem.record_interval(*interval);
            let event = TotemReplenishedEvent {
                player: harness.player,
                used_at: 0,
                replenished_at: *interval,
            };
            harness.event(check, InternalEvent::TotemReplenished(event));
        }
    }

    #[test]
    fn test_metronomic_replenish_flags() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut check = AutoTotemB::new(&harness.config);

        replenished(&mut harness, &mut check, &[150, 152]);
        assert!(flags.lock().is_empty(), "not enough samples yet");

        replenished(&mut harness, &mut check, &[151]);
        assert_eq!(
            *flags.lock(),
            vec![Some("std dev: 1.00ms, samples: [150, 152, 151]".to_string())]
        );
    }

    #[test]
    fn test_jittery_replenish_passes() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut check = AutoTotemB::new(&harness.config);
        replenished(&mut harness, &mut check, &[180, 420, 260, 610]);
        assert_eq!(check.core().violations(), 0);
    }
}
