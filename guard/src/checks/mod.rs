//! Detection units and the per-session registry that drives them.
//!
//! Every check carries a constant [`CheckDescriptor`] next to its
//! implementation. The catalog of factories is validated once when the
//! [`Guard`](crate::Guard) starts, and each session builds its fixed set of
//! active checks when the player finishes logging in.
//!
//! A violation always goes through [`CheckContext::fail`]: a cancellable
//! [`FlagEvent`] is published first and only an un-vetoed flag advances the
//! counter and reaches the alert pipeline.

mod auto_totem;
mod inventory;
mod mods;
mod protocol_checks;

pub use auto_totem::{standard_deviation, AutoTotemA, AutoTotemB};
pub use inventory::{InventoryA, InventoryB, InventoryC};
pub use mods::Mod;
pub use protocol_checks::{ProtocolA, ProtocolB, ProtocolC, ProtocolD};

use crate::alert::AlertPipeline;
use crate::config::GuardConfig;
use crate::error::{GuardError, Result};
use crate::event::{Cancellable, EventBus, FlagEvent, InternalEvent};
use crate::player::PlayerState;
use log::{debug, info};
use protocol::{ClientPacket, InboundPacket, OutboundPacket, PlayerId, ProtocolVersion};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckCategory {
    Inventory,
    Protocol,
    AutoTotem,
    Mod,
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckCategory::Inventory => "inventory",
            CheckCategory::Protocol => "protocol",
            CheckCategory::AutoTotem => "auto totem",
            CheckCategory::Mod => "mod",
        };
        f.write_str(name)
    }
}

/// Protocol feature a check needs before it can be instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    /// The client sends an explicit end-of-tick packet.
    ClientTickEnd,
}

impl Requirement {
    pub fn is_met(self, version: ProtocolVersion) -> bool {
        match self {
            Requirement::None => true,
            Requirement::ClientTickEnd => version.has_client_tick_end(),
        }
    }
}

/// What a check consumes. The registry only dispatches what is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub inbound: bool,
    pub outbound: bool,
    pub events: bool,
}

impl Capabilities {
    pub const INBOUND: Capabilities = Capabilities {
        inbound: true,
        outbound: false,
        events: false,
    };
    pub const EVENTS: Capabilities = Capabilities {
        inbound: false,
        outbound: false,
        events: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.inbound || self.outbound || self.events)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CheckDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub category: CheckCategory,
    pub experimental: bool,
    pub capabilities: Capabilities,
    pub requirement: Requirement,
}

/// State every check owns regardless of what it detects.
#[derive(Debug)]
pub struct CheckCore {
    descriptor: &'static CheckDescriptor,
    violations: u32,
    enabled: bool,
}

impl CheckCore {
    pub fn new(descriptor: &'static CheckDescriptor) -> Self {
        Self {
            descriptor,
            violations: 0,
            enabled: true,
        }
    }

    pub fn descriptor(&self) -> &'static CheckDescriptor {
        self.descriptor
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn reset_violations(&mut self) {
        self.violations = 0;
    }
}

/// Borrowed view of the session a check runs against.
pub struct CheckContext<'a> {
    pub player: PlayerId,
    pub player_name: &'a str,
    pub version: ProtocolVersion,
    pub state: &'a mut PlayerState,
    pub bus: &'a EventBus,
    pub alerts: &'a Arc<AlertPipeline>,
    pub config: &'a GuardConfig,
}

impl CheckContext<'_> {
    /// Reports a violation of the check owning `core`.
    ///
    /// Returns `false` when a [`FlagEvent`] handler vetoed it, in which case
    /// neither the counter nor the alert pipeline is touched.
    pub fn fail(&self, core: &mut CheckCore, debug: Option<String>) -> bool {
        let descriptor = core.descriptor;
        let flag = self.bus.publish(FlagEvent::new(
            self.player,
            self.player_name,
            descriptor.name,
            core.violations,
            debug,
        ));
        if flag.is_cancelled() {
            debug!("{} flag for {} was vetoed", descriptor.name, self.player_name);
            return false;
        }

        core.violations += 1;
        info!(
            "{} failed {} (x{}) {}",
            self.player_name,
            descriptor.name,
            core.violations,
            flag.debug.as_deref().unwrap_or("")
        );

        self.alerts.raise(
            self.player,
            self.player_name,
            descriptor,
            core.violations,
            flag.debug,
        );
        true
    }

    pub fn is_tick_end(&self, packet: &ClientPacket) -> bool {
        crate::processor::is_tick_end(self.version, packet)
    }
}

pub trait Check: Send {
    fn core(&self) -> &CheckCore;
    fn core_mut(&mut self) -> &mut CheckCore;

    fn on_packet_receive(&mut self, _ctx: &mut CheckContext<'_>, _packet: &InboundPacket) {}

    fn on_packet_send(&mut self, _ctx: &mut CheckContext<'_>, _packet: &OutboundPacket) {}

    fn on_event(&mut self, _ctx: &mut CheckContext<'_>, _event: &InternalEvent) {}
}

/// Descriptor plus constructor for one check type.
#[derive(Clone, Copy)]
pub struct CheckFactory {
    pub descriptor: &'static CheckDescriptor,
    pub build: fn(&GuardConfig) -> Box<dyn Check>,
}

impl fmt::Debug for CheckFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckFactory")
            .field("descriptor", &self.descriptor.name)
            .finish()
    }
}

/// Every check shipped with the engine.
pub fn catalog() -> Vec<CheckFactory> {
    vec![
        CheckFactory {
            descriptor: &inventory::INVENTORY_A,
            build: |_| Box::new(InventoryA::new()),
        },
        CheckFactory {
            descriptor: &inventory::INVENTORY_B,
            build: |config| Box::new(InventoryB::new(config)),
        },
        CheckFactory {
            descriptor: &inventory::INVENTORY_C,
            build: |_| Box::new(InventoryC::new()),
        },
        CheckFactory {
            descriptor: &protocol_checks::PROTOCOL_A,
            build: |_| Box::new(ProtocolA::new()),
        },
        CheckFactory {
            descriptor: &protocol_checks::PROTOCOL_B,
            build: |_| Box::new(ProtocolB::new()),
        },
        CheckFactory {
            descriptor: &protocol_checks::PROTOCOL_C,
            build: |_| Box::new(ProtocolC::new()),
        },
        CheckFactory {
            descriptor: &protocol_checks::PROTOCOL_D,
            build: |config| Box::new(ProtocolD::new(config)),
        },
        CheckFactory {
            descriptor: &auto_totem::AUTO_TOTEM_A,
            build: |config| Box::new(AutoTotemA::new(config)),
        },
        CheckFactory {
            descriptor: &auto_totem::AUTO_TOTEM_B,
            build: |config| Box::new(AutoTotemB::new(config)),
        },
        CheckFactory {
            descriptor: &mods::MOD,
            build: |config| Box::new(Mod::new(config)),
        },
    ]
}

/// Rejects a catalog that could not produce well-formed checks.
pub fn validate_catalog(catalog: &[CheckFactory], config: &GuardConfig) -> Result<()> {
    let mut seen = HashSet::new();

    for factory in catalog {
        let descriptor = factory.descriptor;
        if descriptor.name.trim().is_empty() {
            return Err(GuardError::InvalidDescriptor {
                name: descriptor.name.to_string(),
                reason: "empty name".into(),
            });
        }
        if descriptor.description.trim().is_empty() {
            return Err(GuardError::InvalidDescriptor {
                name: descriptor.name.to_string(),
                reason: "empty description".into(),
            });
        }
        if descriptor.capabilities.is_empty() {
            return Err(GuardError::InvalidDescriptor {
                name: descriptor.name.to_string(),
                reason: "consumes neither packets nor events".into(),
            });
        }
        if !seen.insert(descriptor.name) {
            return Err(GuardError::DuplicateCheck(descriptor.name.to_string()));
        }

        let built = (factory.build)(config);
        if built.core().name() != descriptor.name {
            return Err(GuardError::DescriptorMismatch {
                declared: descriptor.name.to_string(),
                built: built.core().name().to_string(),
            });
        }
    }

    Ok(())
}

/// The fixed set of checks active for one session.
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn build(catalog: &[CheckFactory], config: &GuardConfig, version: ProtocolVersion) -> Self {
        let checks = catalog
            .iter()
            .filter(|factory| {
                let descriptor = factory.descriptor;
                if config.is_disabled(descriptor.name) {
                    return false;
                }
                if !descriptor.requirement.is_met(version) {
                    debug!("Skipping {} on protocol {}", descriptor.name, version);
                    return false;
                }
                true
            })
            .map(|factory| (factory.build)(config))
            .collect();

        Self { checks }
    }

    pub fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        for check in self.active(|c| c.inbound) {
            check.on_packet_receive(ctx, packet);
        }
    }

    pub fn on_packet_send(&mut self, ctx: &mut CheckContext<'_>, packet: &OutboundPacket) {
        for check in self.active(|c| c.outbound) {
            check.on_packet_send(ctx, packet);
        }
    }

    pub fn on_event(&mut self, ctx: &mut CheckContext<'_>, event: &InternalEvent) {
        for check in self.active(|c| c.events) {
            check.on_event(ctx, event);
        }
    }

    fn active(
        &mut self,
        consumes: impl Fn(&Capabilities) -> bool,
    ) -> impl Iterator<Item = &mut Box<dyn Check>> {
        self.checks.iter_mut().filter(move |check| {
            let core = check.core();
            core.is_enabled() && consumes(&core.descriptor().capabilities)
        })
    }

    pub fn violations(&self, name: &str) -> Option<u32> {
        self.get(name).map(|check| check.core().violations())
    }

    pub fn reset_violations(&mut self, name: &str) -> bool {
        match self.get_mut(name) {
            Some(check) => {
                check.core_mut().reset_violations();
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.get_mut(name) {
            Some(check) => {
                check.core_mut().set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Check> {
        self.checks
            .iter()
            .find(|check| check.core().name().eq_ignore_ascii_case(name))
            .map(|check| check.as_ref())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Check>> {
        self.checks
            .iter_mut()
            .find(|check| check.core().name().eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Check> {
        self.checks.iter().map(|check| check.as_ref())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{record_flags, CheckHarness};
    use super::*;
    use crate::event::EventOrder;

    static BROKEN_NAME: CheckDescriptor = CheckDescriptor {
        name: "",
        description: "nameless",
        category: CheckCategory::Protocol,
        experimental: false,
        capabilities: Capabilities::INBOUND,
        requirement: Requirement::None,
    };

    static NO_CAPABILITIES: CheckDescriptor = CheckDescriptor {
        name: "Idle",
        description: "consumes nothing",
        category: CheckCategory::Protocol,
        experimental: false,
        capabilities: Capabilities {
            inbound: false,
            outbound: false,
            events: false,
        },
        requirement: Requirement::None,
    };

    #[test]
    fn test_shipped_catalog_is_valid() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 10);
        assert!(validate_catalog(&catalog, &GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut catalog = catalog();
        catalog[0].descriptor = &BROKEN_NAME;
        assert!(matches!(
            validate_catalog(&catalog, &GuardConfig::default()),
            Err(GuardError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_descriptor_without_capabilities_rejected() {
        let mut catalog = catalog();
        catalog[0].descriptor = &NO_CAPABILITIES;
        assert!(matches!(
            validate_catalog(&catalog, &GuardConfig::default()),
            Err(GuardError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = catalog();
        let first = catalog[0];
        catalog.push(first);
        assert!(matches!(
            validate_catalog(&catalog, &GuardConfig::default()),
            Err(GuardError::DuplicateCheck(name)) if name == "InventoryA"
        ));
    }

    #[test]
    fn test_factory_building_wrong_check_rejected() {
        let mut catalog = catalog();
        catalog[0].build = |_| Box::new(InventoryC::new());
        assert!(matches!(
            validate_catalog(&catalog, &GuardConfig::default()),
            Err(GuardError::DescriptorMismatch { .. })
        ));
    }

    #[test]
    fn test_registry_filters_by_requirement_and_config() {
        let config = GuardConfig {
            disabled_checks: vec!["mod".into()],
            ..Default::default()
        };

        let legacy = CheckRegistry::build(&catalog(), &config, ProtocolVersion::V1_20);
        assert!(legacy.get("ProtocolA").is_none());
        assert!(legacy.get("ProtocolC").is_none());
        assert!(legacy.get("Mod").is_none());
        assert_eq!(legacy.len(), 7);

        let modern = CheckRegistry::build(&catalog(), &config, ProtocolVersion::V1_21_2);
        assert!(modern.get("ProtocolA").is_some());
        assert_eq!(modern.len(), 9);
    }

    #[test]
    fn test_fail_counts_and_alerts() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let flags = record_flags(&harness.bus);
        let mut core = CheckCore::new(&inventory::INVENTORY_A);

        let ctx = harness.ctx();
        assert!(ctx.fail(&mut core, Some("attack".into())));
        assert!(ctx.fail(&mut core, None));

        assert_eq!(core.violations(), 2);
        assert_eq!(*flags.lock(), vec![Some("attack".to_string()), None]);
    }

    #[test]
    fn test_vetoed_flag_does_not_count() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        harness
            .bus
            .subscribe(EventOrder::Normal, |event: &mut FlagEvent| {
                event.set_cancelled(true)
            });
        let mut core = CheckCore::new(&inventory::INVENTORY_A);

        let ctx = harness.ctx();
        assert!(!ctx.fail(&mut core, Some("attack".into())));
        assert_eq!(core.violations(), 0);
        assert_eq!(harness.alerts.pending_buffers(), 0);
    }

    #[test]
    fn test_flag_carries_count_before_violation() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let counts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = counts.clone();
        harness.bus.subscribe(EventOrder::Normal, move |event: &mut FlagEvent| {
            sink.lock().push(event.violations)
        });
        let mut core = CheckCore::new(&inventory::INVENTORY_B);

        let ctx = harness.ctx();
        ctx.fail(&mut core, None);
        ctx.fail(&mut core, None);
        assert_eq!(*counts.lock(), vec![0, 1]);
    }

    #[test]
    fn test_disabled_check_is_not_dispatched() {
        let mut harness = CheckHarness::new(ProtocolVersion::V1_20);
        let mut registry = CheckRegistry::build(&catalog(), &harness.config, harness.version);
        harness.state.data.set_open_inventory(true);

        assert!(registry.set_enabled("InventoryA", false));
        let attack = InboundPacket::new(
            ClientPacket::InteractEntity {
                entity_id: 1,
                action: protocol::InteractAction::Attack,
            },
            1,
        );
        registry.on_packet_receive(&mut harness.ctx(), &attack);
        assert_eq!(registry.violations("InventoryA"), Some(0));
        assert!(harness.state.data.open_inventory());

        registry.set_enabled("InventoryA", true);
        registry.on_packet_receive(&mut harness.ctx(), &attack);
        assert_eq!(registry.violations("InventoryA"), Some(1));

        assert!(registry.reset_violations("inventorya"));
        assert_eq!(registry.violations("InventoryA"), Some(0));
    }
}
