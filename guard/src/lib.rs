//! # Guard Detection Engine
//!
//! This library watches the decoded packet stream of every player connection
//! and flags behaviour a vanilla client cannot produce. It sits between the
//! transport, which decodes packets, and the game server, which never sees
//! the engine at all.
//!
//! ## Core Responsibilities
//!
//! ### Shadow State
//! The engine keeps its own picture of each player: inventory contents, the
//! item on the cursor, open windows, movement flags and per-tick activity.
//! Server updates only take effect once the client has provably received
//! them, which is learned through round-trip probes.
//!
//! ### Detection
//! Checks inspect packets and engine events and record violations. Each
//! check is described by a static descriptor and built per connection, so
//! violation counts never leak between players.
//!
//! ### Alerting
//! Violations are coalesced per player and check, formatted off the packet
//! path and delivered in order to every staff member who subscribed.
//!
//! ## Architecture Design
//!
//! ### Per-Connection Serialization
//! All packets of one connection are processed one at a time under the
//! session's lock. Different connections run in parallel. Only the alert
//! pipeline and the event bus are shared between sessions.
//!
//! ### Processors Before Checks
//! Processors update state from every packet; checks observe that state.
//! Anything a processor learns that checks care about is emitted as an
//! internal event and dispatched after the packet's checks have run.
//!
//! ### Acknowledged Server State
//! Outbound inventory updates are applied when the probe that follows them
//! is answered, never when they are sent. Until then the client may still
//! legitimately act on the old contents.
//!
//! ## Module Organization
//!
//! ### Engine (`engine`) and Sessions (`registry`, `session`)
//! Process-wide state, connection lifecycle, and the per-packet pipeline.
//!
//! ### Events (`event`)
//! Typed publish/subscribe bus with priorities and cancellation.
//!
//! ### State (`inventory`, `player`, `latency`)
//! The shadow inventory, the remaining per-player state, and the probe
//! correlator that orders server updates against client actions.
//!
//! ### Processing (`processor`, `checks`, `alert`)
//! State maintenance, the detection checks, and alert delivery.
//!
//! ### Replay (`replay`)
//! Offline playback of recorded connections, used by the `guard-replay` tool.
//!
//! ### Support (`config`, `clock`, `error`)
//! Runtime settings, time sources, and the crate error type.

pub mod alert;
pub mod checks;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod inventory;
pub mod latency;
pub mod player;
pub mod processor;
pub mod registry;
pub mod replay;
pub mod session;

pub use alert::{Alert, AlertFormatter, AlertPipeline, AlertRecipient, PlainFormatter};
pub use config::GuardConfig;
pub use engine::{Guard, GuardOptions};
pub use error::{GuardError, Result};
pub use registry::SessionRegistry;
pub use session::Session;
