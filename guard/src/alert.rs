//! Turns violations into alerts.
//!
//! Raises for the same (player, check) inside one window are merged: the
//! window starts with the first raise and ends with exactly one flush that
//! reports the latest violation count and the latest debug detail.
//!
//! Flushed alerts are formatted on the blocking pool and delivered through a
//! per-player chain of tasks, so messages for one player arrive in the order
//! they were flushed even when a later one formats faster.

use crate::checks::CheckDescriptor;
use crate::event::{AlertEvent, Cancellable, EventBus};
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use protocol::PlayerId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One coalesced alert, as handed to the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub player: PlayerId,
    pub player_name: String,
    pub check: &'static str,
    pub description: &'static str,
    pub experimental: bool,
    pub violations: u32,
    pub debug: Option<String>,
}

/// Renders an alert into the text recipients receive.
pub trait AlertFormatter: Send + Sync {
    fn format(&self, alert: &Alert) -> String;
}

#[derive(Debug, Clone)]
pub struct PlainFormatter {
    prefix: String,
}

impl PlainFormatter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl AlertFormatter for PlainFormatter {
    fn format(&self, alert: &Alert) -> String {
        let mut message = format!(
            "{} {} failed {}",
            self.prefix, alert.player_name, alert.check
        );
        if alert.experimental {
            message.push_str(" (experimental)");
        }
        let _ = write!(message, " (x{})", alert.violations);
        if let Some(debug) = &alert.debug {
            let _ = write!(message, " [{}]", debug);
        }
        message
    }
}

/// Someone who can receive alerts, usually a staff member's connection.
pub trait AlertRecipient: Send + Sync {
    fn id(&self) -> PlayerId;
    fn send_alert(&self, message: &str);
}

struct Chain {
    /// Messages older than this belong to a previous connection.
    first_generation: u64,
    last_generation: u64,
    tail: Option<JoinHandle<()>>,
}

pub struct AlertPipeline {
    runtime: Handle,
    window: Duration,
    formatter: Arc<dyn AlertFormatter>,
    bus: Arc<EventBus>,
    buffers: Mutex<HashMap<(PlayerId, &'static str), Alert>>,
    chains: Mutex<HashMap<PlayerId, Chain>>,
    next_generation: AtomicU64,
    recipients: RwLock<HashMap<PlayerId, Arc<dyn AlertRecipient>>>,
}

impl AlertPipeline {
    pub fn new(
        runtime: Handle,
        window: Duration,
        formatter: Arc<dyn AlertFormatter>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            runtime,
            window,
            formatter,
            bus,
            buffers: Mutex::new(HashMap::new()),
            chains: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            recipients: RwLock::new(HashMap::new()),
        }
    }

    /// Buffers a violation. The first raise for a key schedules its flush.
    pub fn raise(
        self: &Arc<Self>,
        player: PlayerId,
        player_name: &str,
        check: &'static CheckDescriptor,
        violations: u32,
        debug: Option<String>,
    ) {
        let key = (player, check.name);
        let mut buffers = self.buffers.lock();

        match buffers.entry(key) {
            Entry::Occupied(mut entry) => {
                let alert = entry.get_mut();
                alert.violations = violations;
                alert.debug = debug;
            }
            Entry::Vacant(entry) => {
                entry.insert(Alert {
                    player,
                    player_name: player_name.to_string(),
                    check: check.name,
                    description: check.description,
                    experimental: check.experimental,
                    violations,
                    debug,
                });

                let pipeline = Arc::clone(self);
                let window = self.window;
                self.runtime.spawn(async move {
                    tokio::time::sleep(window).await;
                    pipeline.flush(key);
                });
            }
        }
    }

    fn flush(self: &Arc<Self>, key: (PlayerId, &'static str)) {
        // Gone if the player disconnected during the window.
        let Some(alert) = self.buffers.lock().remove(&key) else {
            return;
        };
        self.enqueue(alert);
    }

    /// Appends `alert` to its player's delivery chain.
    fn enqueue(self: &Arc<Self>, alert: Alert) {
        let player = alert.player;

        let formatter = Arc::clone(&self.formatter);
        let to_format = alert.clone();
        let composed = self
            .runtime
            .spawn_blocking(move || formatter.format(&to_format));

        // Held across spawn and insert so the task cannot finish before its
        // handle is recorded. Generations are taken under it too, so they
        // grow in chain order.
        let mut chains = self.chains.lock();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let chain = chains.entry(player).or_insert_with(|| Chain {
            first_generation: generation,
            last_generation: generation,
            tail: None,
        });
        let previous = chain.tail.take();

        let pipeline = Arc::clone(self);
        let handle = self.runtime.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match composed.await {
                Ok(message) => pipeline.deliver(&alert, message, generation),
                Err(e) => error!("Formatting alert for {} failed: {}", alert.check, e),
            }
            pipeline.finish(player, generation);
        });

        chain.last_generation = generation;
        chain.tail = Some(handle);
    }

    fn deliver(&self, alert: &Alert, message: String, generation: u64) {
        let current = self
            .chains
            .lock()
            .get(&alert.player)
            .is_some_and(|chain| chain.first_generation <= generation);
        if !current {
            debug!("Dropping stale alert for {}", alert.player_name);
            return;
        }

        let event = self.bus.publish(AlertEvent::new(
            alert.player,
            alert.check,
            alert.violations,
            message,
        ));
        if event.is_cancelled() {
            return;
        }

        let recipients: Vec<Arc<dyn AlertRecipient>> =
            self.recipients.read().values().cloned().collect();
        for recipient in recipients {
            recipient.send_alert(&event.message);
        }
    }

    fn finish(&self, player: PlayerId, generation: u64) {
        let mut chains = self.chains.lock();
        if let Entry::Occupied(entry) = chains.entry(player) {
            if entry.get().last_generation == generation {
                entry.remove();
            }
        }
    }

    /// Flips alert delivery for `recipient`; returns whether it is now on.
    pub fn toggle_alerts(&self, recipient: Arc<dyn AlertRecipient>) -> bool {
        let id = recipient.id();
        let mut recipients = self.recipients.write();
        let enabled = if recipients.remove(&id).is_some() {
            false
        } else {
            recipients.insert(id, recipient);
            true
        };
        info!(
            "Alerts {} for {}",
            if enabled { "enabled" } else { "disabled" },
            id
        );
        enabled
    }

    pub fn enable_alerts(&self, recipient: Arc<dyn AlertRecipient>) {
        let id = recipient.id();
        if self.recipients.write().insert(id, recipient).is_none() {
            info!("Alerts enabled for {}", id);
        }
    }

    pub fn has_alerts_enabled(&self, player: PlayerId) -> bool {
        self.recipients.read().contains_key(&player)
    }

    /// Discards every buffer, queued delivery and subscription of `player`.
    pub fn remove_player(&self, player: PlayerId) {
        self.buffers.lock().retain(|(owner, _), _| *owner != player);
        self.chains.lock().remove(&player);
        self.recipients.write().remove(&player);
    }

    pub fn pending_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn pending_chains(&self) -> usize {
        self.chains.lock().len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
