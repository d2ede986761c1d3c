use crate::{ClientPacket, PlayerId, ProtocolVersion, ServerPacket};
use serde::{Deserialize, Serialize};

/// One recorded packet in a capture, in the order it crossed the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptureRecord {
    Inbound { timestamp: u64, packet: ClientPacket },
    Outbound { timestamp: u64, packet: ServerPacket },
}

impl CaptureRecord {
    pub fn timestamp(&self) -> u64 {
        match self {
            CaptureRecord::Inbound { timestamp, .. } | CaptureRecord::Outbound { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// A recorded packet stream for a single player connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub player: PlayerId,
    pub name: String,
    pub version: ProtocolVersion,
    pub records: Vec<CaptureRecord>,
}

impl Capture {
    pub fn new(player: PlayerId, name: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            player,
            name: name.into(),
            version,
            records: Vec::new(),
        }
    }

    pub fn inbound(&mut self, timestamp: u64, packet: ClientPacket) -> &mut Self {
        self.records.push(CaptureRecord::Inbound { timestamp, packet });
        self
    }

    pub fn outbound(&mut self, timestamp: u64, packet: ServerPacket) -> &mut Self {
        self.records.push(CaptureRecord::Outbound { timestamp, packet });
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
