//! Connection lifecycle for every checked player
//!
//! This module maps connection identities to their [`Session`]s:
//! - Handshake creates a session unless the connection is exempt
//! - Login builds the session's checks, or exempts players with a bypass
//! - Disconnect tears the session down together with its alert state
//!
//! Packets for connections that have no session are dropped silently, since
//! a packet racing a disconnect is expected.

use crate::alert::AlertRecipient;
use crate::engine::Guard;
use crate::error::{GuardError, Result};
use crate::event::{UserJoinEvent, UserQuitEvent};
use crate::session::Session;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use protocol::{InboundPacket, OutboundPacket, PacketSink, PlayerId, ProtocolVersion};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Bedrock players bridged onto the server carry ids with zeroed high bits.
/// Their packet streams are translated and would only produce noise.
fn is_bedrock(id: PlayerId) -> bool {
    id.as_bytes()[..8].iter().all(|b| *b == 0)
}

/// Tracks all checked sessions and the connections exempt from checking
///
/// Sessions are handed out as `Arc<Mutex<Session>>` so different
/// connections can be processed on different threads while each session's
/// packets stay serialized.
pub struct SessionRegistry {
    guard: Arc<Guard>,
    /// Live sessions indexed by connection identity
    sessions: RwLock<HashMap<PlayerId, Arc<Mutex<Session>>>>,
    /// Connections that are never checked
    exempt: RwLock<HashSet<PlayerId>>,
}

impl SessionRegistry {
    pub fn new(guard: Arc<Guard>) -> Self {
        Self {
            guard,
            sessions: RwLock::new(HashMap::new()),
            exempt: RwLock::new(HashSet::new()),
        }
    }

    /// Creates the session for a connection that completed its handshake
    ///
    /// Returns false when the connection is exempt and no session was made.
    pub fn on_handshake(
        &self,
        id: PlayerId,
        name: &str,
        version: ProtocolVersion,
        sink: Arc<dyn PacketSink>,
    ) -> bool {
        if is_bedrock(id) || self.guard.config().is_exempt_name(name) {
            warn!("Not checking {} ({})", name, id);
            self.exempt.write().insert(id);
            return false;
        }

        let session = Session::new(self.guard.clone(), id, name, version, sink);
        self.sessions
            .write()
            .insert(id, Arc::new(Mutex::new(session)));
        info!("{} connected on protocol {}", name, version);
        true
    }

    /// Promotes a session to checkable once login completed
    ///
    /// Players holding the bypass permission are exempted and their session
    /// is dropped. `recipient` receives alerts right away when the player is
    /// listed in the configured alert subscribers.
    pub fn on_login(
        &self,
        id: PlayerId,
        bypass: bool,
        recipient: Option<Arc<dyn AlertRecipient>>,
    ) -> bool {
        if self.is_exempt(id) {
            return false;
        }
        let Some(session) = self.session(id) else {
            return false;
        };

        if bypass {
            let name = session.lock().name().to_string();
            warn!("{} has bypass, not checking", name);
            self.exempt.write().insert(id);
            self.sessions.write().remove(&id);
            return false;
        }

        let name = {
            let mut session = session.lock();
            session.on_login();
            session.name().to_string()
        };
        self.guard.bus().publish(UserJoinEvent::new(id, name));

        if let Some(recipient) = recipient {
            if self.guard.config().alerts_for.contains(&recipient.id()) {
                self.guard.alerts().enable_alerts(recipient);
            }
        }
        true
    }

    /// Removes every trace of a connection
    ///
    /// Safe to call for unknown or exempt connections.
    pub fn on_disconnect(&self, id: PlayerId) {
        let removed = self.sessions.write().remove(&id);
        self.exempt.write().remove(&id);
        self.guard.alerts().remove_player(id);

        if let Some(session) = removed {
            let name = session.lock().name().to_string();
            info!("{} disconnected", name);
            self.guard.bus().publish(UserQuitEvent::new(id, name));
        }
    }

    pub fn handle_inbound(&self, id: PlayerId, packet: &mut InboundPacket) {
        if let Some(session) = self.session(id) {
            session.lock().handle_inbound(packet);
        }
    }

    pub fn handle_outbound(&self, id: PlayerId, packet: &mut OutboundPacket) {
        if let Some(session) = self.session(id) {
            session.lock().handle_outbound(packet);
        }
    }

    pub fn session(&self, id: PlayerId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Runs `f` against a live session, for callers that need an answer.
    pub fn with_session<R>(&self, id: PlayerId, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let session = self.session(id).ok_or(GuardError::UnknownSession(id))?;
        let mut session = session.lock();
        Ok(f(&mut session))
    }

    pub fn is_exempt(&self, id: PlayerId) -> bool {
        self.exempt.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn guard(&self) -> &Arc<Guard> {
        &self.guard
    }
}
