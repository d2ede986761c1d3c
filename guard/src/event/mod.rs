//! In-process typed publish/subscribe.
//!
//! Handlers are grouped in five [`EventOrder`] bands. Within a band, typed
//! handlers run first, then handlers registered for every event including
//! internal ones, then handlers registered for every public event. Inside a
//! bucket, handlers run in subscription order.
//!
//! Dispatch is synchronous and single pass. A panicking handler is logged
//! and skipped; the remaining handlers still see the event.

mod types;

pub use types::{
    AlertEvent, FlagEvent, InventoryChangedEvent, TotemActivatedEvent, TotemReplenishedEvent,
    UserJoinEvent, UserQuitEvent,
};

use log::error;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventOrder {
    First,
    Early,
    Normal,
    Late,
    Last,
}

const BANDS: usize = 5;

impl EventOrder {
    fn index(self) -> usize {
        self as usize
    }
}

pub trait Event: Any + Send {
    fn name(&self) -> &'static str;

    /// Internal events never reach subscribers registered through
    /// [`EventBus::subscribe_all`].
    fn internal(&self) -> bool {
        false
    }

    fn as_cancellable(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }
}

pub trait Cancellable {
    fn is_cancelled(&self) -> bool;
    fn set_cancelled(&mut self, cancelled: bool);
}

/// Internal events a session raises for itself. They are published on the
/// bus and then handed to that session's own checks.
#[derive(Debug, Clone)]
pub enum InternalEvent {
    InventoryChanged(InventoryChangedEvent),
    TotemActivated(TotemActivatedEvent),
    TotemReplenished(TotemReplenishedEvent),
}

type TypedHandler = Arc<dyn Fn(&mut dyn Any) + Send + Sync>;
type AnyHandler = Arc<dyn Fn(&mut dyn Event) + Send + Sync>;
type Bands<H> = [Vec<(u64, H)>; BANDS];

/// Handler lists are shared with in-flight dispatches and copied only when
/// a subscription changes while one of those still holds them.
#[derive(Default)]
struct Handlers {
    typed: HashMap<TypeId, Arc<Bands<TypedHandler>>>,
    including_internal: Arc<Bands<AnyHandler>>,
    everything: Arc<Bands<AnyHandler>>,
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Typed(TypeId),
    IncludingInternal,
    Everything,
}

pub struct EventBus {
    handlers: Arc<RwLock<Handlers>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Handlers::default())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<E, F>(&self, order: EventOrder, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let wrapped: TypedHandler = Arc::new(move |event: &mut dyn Any| {
            if let Some(event) = event.downcast_mut::<E>() {
                handler(event);
            }
        });

        let type_id = TypeId::of::<E>();
        let mut handlers = self.handlers.write();
        let bands = handlers.typed.entry(type_id).or_default();
        Arc::make_mut(bands)[order.index()].push((id, wrapped));
        drop(handlers);

        self.subscription(Bucket::Typed(type_id), id)
    }

    /// Subscribes to every public event.
    pub fn subscribe_all<F>(&self, order: EventOrder, handler: F) -> Subscription
    where
        F: Fn(&mut dyn Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut handlers.everything)[order.index()].push((id, Arc::new(handler)));
        drop(handlers);
        self.subscription(Bucket::Everything, id)
    }

    /// Subscribes to every event, internal ones included.
    pub fn subscribe_all_including_internal<F>(&self, order: EventOrder, handler: F) -> Subscription
    where
        F: Fn(&mut dyn Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut handlers.including_internal)[order.index()]
            .push((id, Arc::new(handler)));
        drop(handlers);
        self.subscription(Bucket::IncludingInternal, id)
    }

    /// Dispatches `event` and hands it back, so cancellation and other
    /// mutations made by handlers are visible to the publisher.
    pub fn publish<E: Event>(&self, mut event: E) -> E {
        // Handlers are snapshotted so they may subscribe or unsubscribe
        // while the event is being dispatched.
        let (typed, including_internal, everything) = {
            let handlers = self.handlers.read();
            let typed = handlers.typed.get(&TypeId::of::<E>()).cloned();
            let everything = if event.internal() {
                None
            } else {
                Some(Arc::clone(&handlers.everything))
            };
            (typed, Arc::clone(&handlers.including_internal), everything)
        };

        let name = event.name();
        for band in 0..BANDS {
            for (_, handler) in typed.iter().flat_map(|bands| &bands[band]) {
                isolate(name, || handler(&mut event));
            }
            for (_, handler) in &including_internal[band] {
                isolate(name, || handler(&mut event));
            }
            for (_, handler) in everything.iter().flat_map(|bands| &bands[band]) {
                isolate(name, || handler(&mut event));
            }
        }

        event
    }

    fn subscription(&self, bucket: Bucket, id: u64) -> Subscription {
        Subscription {
            handlers: Arc::downgrade(&self.handlers),
            bucket,
            id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn isolate(event: &str, handler: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!("A handler for {} panicked, continuing dispatch", event);
    }
}

/// Handle returned by every subscribe call.
pub struct Subscription {
    handlers: Weak<RwLock<Handlers>>,
    bucket: Bucket,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(handlers) = self.handlers.upgrade() else {
            return;
        };
        let mut handlers = handlers.write();
        let id = self.id;

        match self.bucket {
            Bucket::Typed(type_id) => {
                if let Some(bands) = handlers.typed.get_mut(&type_id) {
                    Arc::make_mut(bands)
                        .iter_mut()
                        .for_each(|band| band.retain(|(h, _)| *h != id));
                }
            }
            Bucket::IncludingInternal => Arc::make_mut(&mut handlers.including_internal)
                .iter_mut()
                .for_each(|band| band.retain(|(h, _)| *h != id)),
            Bucket::Everything => Arc::make_mut(&mut handlers.everything)
                .iter_mut()
                .for_each(|band| band.retain(|(h, _)| *h != id)),
        }
    }
}
