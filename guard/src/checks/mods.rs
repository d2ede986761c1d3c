use super::{
    Capabilities, Check, CheckCategory, CheckContext, CheckCore, CheckDescriptor, Requirement,
};
use crate::config::{GuardConfig, ModSignature};
use protocol::{ClientPacket, InboundPacket};

pub(crate) static MOD: CheckDescriptor = CheckDescriptor {
    name: "Mod",
    description: "Mod detection",
    category: CheckCategory::Mod,
    experimental: false,
    capabilities: Capabilities::INBOUND,
    requirement: Requirement::None,
};

const REGISTER_CHANNEL: &str = "minecraft:register";

/// Recognises client mods from the plugin channels they talk on or register.
pub struct Mod {
    core: CheckCore,
    signatures: Vec<ModSignature>,
}

impl Mod {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            core: CheckCore::new(&MOD),
            signatures: config.mod_signatures.clone(),
        }
    }

    fn matching_signature(&self, value: &str) -> Option<&ModSignature> {
        self.signatures.iter().find(|signature| {
            signature
                .keywords
                .iter()
                .any(|keyword| !keyword.is_empty() && value.contains(keyword.as_str()))
        })
    }
}

impl Check for Mod {
    fn core(&self) -> &CheckCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckCore {
        &mut self.core
    }

    fn on_packet_receive(&mut self, ctx: &mut CheckContext<'_>, packet: &InboundPacket) {
        let ClientPacket::PluginMessage { channel, data } = &packet.packet else {
            return;
        };
        let channel = channel.to_lowercase();

        let values: Vec<String> = if channel == REGISTER_CHANNEL {
            String::from_utf8_lossy(data)
                .split('\0')
                .map(str::to_lowercase)
                .collect()
        } else {
            vec![channel]
        };

        let hits: Vec<String> = values
            .iter()
            .filter_map(|value| self.matching_signature(value))
            .map(|signature| signature.name.clone())
            .collect();

        for name in hits {
            ctx.fail(&mut self.core, Some(name));
        }
    }
}
