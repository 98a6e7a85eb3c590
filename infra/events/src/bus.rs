use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::relay::{Relay, RelayShared};
use crate::signal::{ConnectionHandle, ErasedSignal, Signal};
use crate::subscriber::{Link, Receive};
use crate::type_index::{EventTypeIndex, type_index};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Marker trait for types that can be sent across a [`Bus`].
///
/// Any type that is `Clone + Send + Sync + 'static` automatically implements this trait.
/// `Clone` is needed to hand a copy of every event to each attached [`Relay`].
pub trait Event: Any + Clone + Send + Sync + 'static {}
impl<T: Any + Clone + Send + Sync + 'static> Event for T {}

/// State shared between a [`Bus`] and the weak back-references held by its
/// subscribers and relays.
pub(crate) struct BusShared {
    /// Per-type signals addressed by [`EventTypeIndex`]. Only ever grows.
    signals: RwLock<Vec<Option<Arc<dyn ErasedSignal>>>>,
    /// Attached relays; guarded separately so relay bookkeeping never waits on emits.
    relays: Mutex<Vec<Weak<RelayShared>>>,
    /// Subscriber links to invalidate if the bus goes away first.
    links: Mutex<Vec<Weak<Link>>>,
}

impl BusShared {
    fn with_capacity(config: &BusConfig) -> Self {
        Self {
            signals: RwLock::new(Vec::with_capacity(config.type_capacity)),
            relays: Mutex::new(Vec::with_capacity(config.relay_capacity)),
            links: Mutex::new(Vec::new()),
        }
    }

    fn signal<T: Event>(&self) -> Option<Arc<Signal<T>>> {
        let index = type_index::<T>().get();
        let erased = self.signals.read().get(index).and_then(Option::clone)?;
        downcast::<T>(erased)
    }

    fn get_or_create_signal<T: Event>(&self) -> Arc<Signal<T>> {
        if let Some(signal) = self.signal::<T>() {
            return signal;
        }

        let index = type_index::<T>().get();
        let mut signals = self.signals.write();
        if index >= signals.len() {
            signals.resize_with(index + 1, || None);
        }
        let erased = signals[index]
            .get_or_insert_with(|| {
                trace!(event = type_name::<T>(), index, "Initializing new event signal");
                let signal: Arc<dyn ErasedSignal> = Arc::new(Signal::<T>::new());
                signal
            })
            .clone();
        drop(signals);

        downcast::<T>(erased).unwrap_or_else(|| {
            unreachable!("signal slot {index} holds a different event type than {}", type_name::<T>())
        })
    }

    pub(crate) fn disconnect_index(&self, index: EventTypeIndex, handle: ConnectionHandle) -> bool {
        let signal = self.signals.read().get(index.get()).and_then(Option::clone);
        signal.is_some_and(|signal| signal.disconnect_erased(handle))
    }

    pub(crate) fn register_link(&self, link: &Arc<Link>) {
        let mut links = self.links.lock();
        links.retain(|weak| weak.strong_count() > 0);
        if !links.iter().any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(link))) {
            links.push(Arc::downgrade(link));
        }
    }

    pub(crate) fn forget_link(&self, link: &Link) {
        self.links.lock().retain(|weak| !std::ptr::eq(weak.as_ptr(), link));
    }

    fn forward<T: Event>(&self, events: &[T]) {
        let relays = self.relays.lock();
        if relays.is_empty() {
            return;
        }
        for relay in relays.iter().filter_map(Weak::upgrade) {
            for event in events {
                relay.push(event.clone());
            }
        }
        trace!(event = type_name::<T>(), count = events.len(), relays = relays.len(), "Events forwarded");
    }

    pub(crate) fn attach_relay(self: &Arc<Self>, relay: &Arc<RelayShared>) -> Result<()> {
        let mut relays = self.relays.lock();
        relay.set_upstream(self)?;
        relays.push(Arc::downgrade(relay));
        debug!(relays = relays.len(), "Relay attached");
        Ok(())
    }

    pub(crate) fn detach_relay(self: &Arc<Self>, relay: &Arc<RelayShared>) -> Result<()> {
        let mut relays = self.relays.lock();
        let Some(pos) =
            relays.iter().position(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(relay)))
        else {
            return Err(BusError::protocol("relay is not attached to this bus"));
        };
        relay.clear_upstream(self)?;
        relays.swap_remove(pos);
        debug!(relays = relays.len(), "Relay detached");
        Ok(())
    }
}

impl fmt::Debug for BusShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slots, listeners) = {
            let signals = self.signals.read();
            let live = signals.iter().flatten();
            (live.clone().count(), live.map(|signal| signal.listener_count()).sum::<usize>())
        };
        f.debug_struct("BusShared")
            .field("slots", &slots)
            .field("listeners", &listeners)
            .field("relays", &self.relays.lock().len())
            .field("links", &self.links.lock().len())
            .finish()
    }
}

fn downcast<T: Event>(erased: Arc<dyn ErasedSignal>) -> Option<Arc<Signal<T>>> {
    erased.into_any().downcast::<Signal<T>>().ok()
}

/// Synchronous, type-indexed event bus.
///
/// Every event type gets its own signal, created lazily on first connect. Emitting
/// runs the local callables on the calling thread, in connection order, and then
/// pushes a copy of the event into the queue of every attached [`Relay`].
///
/// The bus is the owner of its dispatch state: dropping it detaches all relays and
/// invalidates all subscribers still attached to it. Share it between threads
/// through an `Arc`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use tybus_events::Bus;
///
/// #[derive(Clone)]
/// struct IntEvent { value: i32 }
///
/// let bus = Bus::new();
/// let seen = Arc::new(AtomicI32::new(0));
///
/// let sink = Arc::clone(&seen);
/// let handle = bus.connect(move |event: &mut IntEvent| sink.store(event.value, Ordering::SeqCst));
///
/// bus.emit(IntEvent { value: 42 });
/// assert_eq!(seen.load(Ordering::SeqCst), 42);
///
/// bus.disconnect::<IntEvent>(handle);
/// bus.emit(IntEvent { value: 7 });
/// assert_eq!(seen.load(Ordering::SeqCst), 42);
/// ```
pub struct Bus {
    shared: Arc<BusShared>,
}

impl Bus {
    /// Creates a new, empty `Bus`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&BusConfig::default())
    }

    /// Creates a bus with its tables pre-sized from `config`.
    #[must_use]
    pub fn with_config(config: &BusConfig) -> Self {
        Self { shared: Arc::new(BusShared::with_capacity(config)) }
    }

    /// Reserves room for `additional` more event type slots.
    pub fn reserve(&self, additional: usize) {
        self.shared.signals.write().reserve(additional);
    }

    /// Connects a callable for events of type `T`.
    ///
    /// The callable has no lifetime protocol; keep the returned handle to remove it
    /// with [`Bus::disconnect`].
    pub fn connect<T, F>(&self, callback: F) -> ConnectionHandle
    where
        T: Event,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let handle = self.shared.get_or_create_signal::<T>().connect(Arc::new(callback));
        trace!(event = type_name::<T>(), %handle, "Callback connected");
        handle
    }

    /// Connects a stateful subscriber for events of type `T`.
    ///
    /// The bus only keeps a weak reference to `subscriber`. Its [`Subscription`]
    /// records the connection and removes it when the subscriber is dropped.
    ///
    /// # Errors
    /// Returns [`BusError::ProtocolViolation`] if the subscriber is attached to another
    /// live bus, or is already connected to this bus for `T`.
    ///
    /// [`Subscription`]: crate::Subscription
    pub fn connect_subscriber<T, S>(&self, subscriber: &Arc<S>) -> Result<ConnectionHandle>
    where
        T: Event,
        S: Receive<T>,
    {
        let signal = self.shared.get_or_create_signal::<T>();
        let weak = Arc::downgrade(subscriber);
        subscriber.subscription().link().attach(&self.shared, type_index::<T>(), move || {
            signal.connect(Arc::new(move |event: &mut T| {
                if let Some(subscriber) = weak.upgrade() {
                    subscriber.receive(event);
                }
            }))
        })
    }

    /// Removes the callable behind `handle`. Unknown or already removed handles are ignored.
    pub fn disconnect<T: Event>(&self, handle: ConnectionHandle) {
        let removed = self.shared.disconnect_index(type_index::<T>(), handle);
        trace!(event = type_name::<T>(), %handle, removed, "Callback disconnected");
    }

    /// Emits an owned event.
    pub fn emit<T: Event>(&self, mut event: T) {
        self.emit_ref(&mut event);
    }

    /// Emits an event by reference; callables may mutate it, and relays receive the
    /// mutated value.
    pub fn emit_ref<T: Event>(&self, event: &mut T) {
        if let Some(signal) = self.shared.signal::<T>() {
            signal.emit(event);
        }
        self.shared.forward(std::slice::from_ref(&*event));
    }

    /// Emits a batch of events of one type, in order.
    ///
    /// # Examples
    /// ```rust
    /// use std::sync::{Arc, Mutex};
    /// use tybus_events::Bus;
    ///
    /// #[derive(Clone)]
    /// struct Reading(u16);
    ///
    /// let bus = Bus::new();
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&seen);
    /// bus.connect(move |reading: &mut Reading| sink.lock().unwrap().push(reading.0));
    ///
    /// let mut batch = [Reading(3), Reading(1), Reading(2)];
    /// bus.emit_batch(&mut batch);
    /// assert_eq!(*seen.lock().unwrap(), [3, 1, 2]);
    /// ```
    pub fn emit_batch<T: Event>(&self, events: &mut [T]) {
        if events.is_empty() {
            return;
        }
        if let Some(signal) = self.shared.signal::<T>() {
            for event in events.iter_mut() {
                signal.emit(event);
            }
        }
        self.shared.forward(events);
    }

    /// Attaches `relay`, so that every event emitted from now on is also queued on it.
    ///
    /// # Errors
    /// Returns [`BusError::ProtocolViolation`] if the relay already has an upstream bus.
    pub fn connect_relay(&self, relay: &Relay) -> Result<()> {
        self.shared
            .attach_relay(relay.shared())
            .inspect_err(|err| warn!(%err, "Relay attach rejected"))
    }

    /// Detaches `relay`; events emitted afterwards are no longer queued on it.
    ///
    /// # Errors
    /// Returns [`BusError::ProtocolViolation`] if the relay is not attached to this bus.
    pub fn disconnect_relay(&self, relay: &Relay) -> Result<()> {
        self.shared
            .detach_relay(relay.shared())
            .inspect_err(|err| warn!(%err, "Relay detach rejected"))
    }

    /// Number of callables connected for `T`.
    #[must_use]
    pub fn listener_count<T: Event>(&self) -> usize {
        self.shared.signal::<T>().map_or(0, |signal| signal.len())
    }

    /// Whether a signal slot exists for `T`.
    #[must_use]
    pub fn has_slot<T: Event>(&self) -> bool {
        self.shared.signal::<T>().is_some()
    }

    /// Number of attached relays.
    #[must_use]
    pub fn relay_count(&self) -> usize {
        self.shared.relays.lock().len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus").field("shared", &self.shared).finish()
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        let relays = {
            let mut relays = self.shared.relays.lock();
            let attached: Vec<_> = relays.drain(..).filter_map(|weak| weak.upgrade()).collect();
            for relay in &attached {
                relay.release_upstream(&self.shared);
            }
            attached.len()
        };

        let links = std::mem::take(&mut *self.shared.links.lock());
        let mut invalidated = 0_usize;
        for link in links.iter().filter_map(Weak::upgrade) {
            link.invalidate(&self.shared);
            invalidated += 1;
        }

        debug!(relays, subscribers = invalidated, "Bus dropped");
    }
}
