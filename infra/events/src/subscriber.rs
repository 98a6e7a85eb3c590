use crate::bus::BusShared;
use crate::error::{BusError, Result};
use crate::signal::ConnectionHandle;
use crate::type_index::{EventTypeIndex, type_index};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// A stateful object that can be attached to a [`Bus`](crate::Bus).
///
/// Implementors embed a [`Subscription`] and expose it here. The subscription
/// tracks every live connection of the object and removes all of them when the
/// object is dropped.
pub trait Subscriber: Send + Sync + 'static {
    /// The subscription embedded in this object.
    fn subscription(&self) -> &Subscription;
}

/// Receiving side of a [`Subscriber`] for events of type `E`.
///
/// Implement it once per event type the object listens to.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use tybus_events::{Bus, Receive, Subscriber, Subscription};
///
/// #[derive(Clone)]
/// struct Deposit(i64);
///
/// #[derive(Default)]
/// struct Ledger {
///     balance: AtomicI64,
///     subscription: Subscription,
/// }
///
/// impl Subscriber for Ledger {
///     fn subscription(&self) -> &Subscription {
///         &self.subscription
///     }
/// }
///
/// impl Receive<Deposit> for Ledger {
///     fn receive(&self, event: &mut Deposit) {
///         self.balance.fetch_add(event.0, Ordering::SeqCst);
///     }
/// }
///
/// # fn main() -> Result<(), tybus_events::BusError> {
/// let bus = Bus::new();
/// let ledger = Arc::new(Ledger::default());
/// bus.connect_subscriber::<Deposit, _>(&ledger)?;
///
/// bus.emit(Deposit(40));
/// bus.emit(Deposit(2));
/// assert_eq!(ledger.balance.load(Ordering::SeqCst), 42);
/// # Ok(())
/// # }
/// ```
pub trait Receive<E>: Subscriber {
    /// Handles one event. The event may be mutated; relays see the mutated value.
    fn receive(&self, event: &mut E);
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    index: EventTypeIndex,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
struct LinkState {
    bus: Weak<BusShared>,
    slots: Vec<Slot>,
}

/// Shared half of a [`Subscription`]; the bus keeps a weak reference to it so it can
/// invalidate the back-reference when the bus goes away first.
#[derive(Debug, Default)]
pub(crate) struct Link {
    state: Mutex<LinkState>,
    live: AtomicUsize,
}

impl Link {
    /// Binds the link to `bus` and records a new connection for `index`.
    ///
    /// The connection itself is made by `connect` while the link is locked, so the
    /// slot and the live count are updated atomically with the registration.
    pub(crate) fn attach(
        self: &Arc<Self>,
        bus: &Arc<BusShared>,
        index: EventTypeIndex,
        connect: impl FnOnce() -> ConnectionHandle,
    ) -> Result<ConnectionHandle> {
        let mut state = self.state.lock();

        match state.bus.upgrade() {
            Some(current) if !Arc::ptr_eq(&current, bus) => {
                warn!(%index, "Subscriber is already attached to another bus");
                return Err(BusError::protocol("subscriber is already attached to another bus"));
            },
            Some(_) => {
                if state.slots.iter().any(|slot| slot.index == index) {
                    warn!(%index, "Subscriber is already connected for this event type");
                    return Err(BusError::protocol(format!(
                        "subscriber is already connected for event type {index}"
                    )));
                }
            },
            None => {
                if !state.slots.is_empty() {
                    trace!(stale = state.slots.len(), "Discarding slots of an invalidated bus");
                    state.slots.clear();
                }
                self.live.store(0, Ordering::Release);
                state.bus = Arc::downgrade(bus);
                bus.register_link(self);
            },
        }

        let handle = connect();
        state.slots.push(Slot { index, handle });
        self.live.fetch_add(1, Ordering::AcqRel);
        trace!(%index, %handle, live = self.live.load(Ordering::Acquire), "Subscriber attached");
        Ok(handle)
    }

    /// Drops the connection for `index`, if any. A no-op once the bus is gone.
    fn detach_one(&self, index: EventTypeIndex) {
        let (bus, handle, remaining) = {
            let mut state = self.state.lock();
            let Some(bus) = state.bus.upgrade() else {
                return;
            };
            let Some(pos) = state.slots.iter().position(|slot| slot.index == index) else {
                return;
            };
            let slot = state.slots.swap_remove(pos);
            let remaining = self.live.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
            if remaining == 0 {
                // Unbind and unregister under the same lock, so a concurrent attach
                // re-registers only after the old entry is gone.
                state.bus = Weak::new();
                bus.forget_link(self);
            }
            (bus, slot.handle, remaining)
        };

        bus.disconnect_index(index, handle);
        trace!(%index, %handle, remaining, "Subscriber detached");
    }

    /// Clears the back-reference if it still points at `bus`. Never calls into the bus
    /// and leaves the live count as it is.
    pub(crate) fn invalidate(&self, bus: &Arc<BusShared>) {
        let mut state = self.state.lock();
        if std::ptr::eq(state.bus.as_ptr(), Arc::as_ptr(bus)) {
            state.bus = Weak::new();
        }
    }

    fn indices(&self) -> Vec<EventTypeIndex> {
        self.state.lock().slots.iter().map(|slot| slot.index).collect()
    }
}

/// Lifetime capability embedded into subscriber objects.
///
/// Holds a back-reference to at most one bus plus one slot per connected event
/// type. Dropping the subscription disconnects every slot; if the bus was dropped
/// first, the subscription has already been invalidated and dropping it is a
/// no-op.
#[derive(Default)]
pub struct Subscription {
    link: Arc<Link>,
}

impl Subscription {
    /// Creates an unattached subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnects the slot for `E`. Safe to call when not connected or after the bus
    /// was dropped.
    pub fn disconnect<E: 'static>(&self) {
        self.link.detach_one(type_index::<E>());
    }

    /// Disconnects every slot.
    pub fn disconnect_all(&self) {
        for index in self.link.indices() {
            self.link.detach_one(index);
        }
    }

    /// Whether the subscription currently references a live bus.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.link.state.lock().bus.strong_count() > 0
    }

    /// Whether a slot for `E` is connected to a live bus.
    #[must_use]
    pub fn is_connected<E: 'static>(&self) -> bool {
        let index = type_index::<E>();
        let state = self.link.state.lock();
        state.bus.strong_count() > 0 && state.slots.iter().any(|slot| slot.index == index)
    }

    /// Number of live `(event type, bus)` connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.link.live.load(Ordering::Acquire)
    }

    pub(crate) const fn link(&self) -> &Arc<Link> {
        &self.link
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.is_attached())
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
