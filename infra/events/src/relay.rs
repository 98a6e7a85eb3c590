use crate::bus::{Bus, BusShared, Event};
use crate::config::RelayConfig;
use crate::error::{BusError, Result};
use crate::queue::AsyncQueue;
use crate::signal::ConnectionHandle;
use crate::subscriber::Receive;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// The half of a [`Relay`] an upstream bus points at.
pub(crate) struct RelayShared {
    queue: AsyncQueue,
    upstream: Mutex<Weak<BusShared>>,
}

impl RelayShared {
    pub(crate) fn push<T: Event>(&self, event: T) {
        self.queue.push(event);
    }

    /// Called by the upstream bus with its relay set locked.
    pub(crate) fn set_upstream(&self, bus: &Arc<BusShared>) -> Result<()> {
        let mut upstream = self.upstream.lock();
        if upstream.strong_count() > 0 {
            return Err(BusError::protocol("relay is already attached to a bus"));
        }
        *upstream = Arc::downgrade(bus);
        Ok(())
    }

    /// Called by the upstream bus with its relay set locked.
    pub(crate) fn clear_upstream(&self, bus: &Arc<BusShared>) -> Result<()> {
        let mut upstream = self.upstream.lock();
        if !std::ptr::eq(upstream.as_ptr(), Arc::as_ptr(bus)) {
            return Err(BusError::protocol("relay upstream does not match the detaching bus"));
        }
        *upstream = Weak::new();
        Ok(())
    }

    /// Clears the upstream pointer while `bus` is being dropped.
    pub(crate) fn release_upstream(&self, bus: &Arc<BusShared>) {
        let mut upstream = self.upstream.lock();
        if std::ptr::eq(upstream.as_ptr(), Arc::as_ptr(bus)) {
            *upstream = Weak::new();
        }
    }
}

impl fmt::Debug for RelayShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayShared")
            .field("queue", &self.queue)
            .field("attached", &(self.upstream.lock().strong_count() > 0))
            .finish()
    }
}

/// Buffers events emitted on an upstream [`Bus`] and re-delivers them to its own
/// local subscribers when [`dispatch`](Self::dispatch) is called.
///
/// The typical setup attaches the relay on the producing side and moves it to a
/// consumer thread that calls `dispatch` on its own schedule:
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::thread;
/// use tybus_events::{Bus, Relay};
///
/// #[derive(Clone)]
/// struct IntEvent { value: i32 }
///
/// # fn main() -> Result<(), tybus_events::BusError> {
/// let bus = Bus::new();
/// let relay = Relay::new();
/// let seen = Arc::new(AtomicI32::new(0));
///
/// let sink = Arc::clone(&seen);
/// relay.connect(move |event: &mut IntEvent| { sink.fetch_add(event.value, Ordering::SeqCst); });
/// bus.connect_relay(&relay)?;
///
/// bus.emit(IntEvent { value: 5 });
/// assert_eq!(seen.load(Ordering::SeqCst), 0);
///
/// thread::spawn(move || relay.dispatch()).join().unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    shared: Arc<RelayShared>,
    bus: Bus,
}

impl Relay {
    /// Creates a detached relay with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&RelayConfig::default())
    }

    /// Creates a detached relay sized from `config`.
    #[must_use]
    pub fn with_config(config: &RelayConfig) -> Self {
        Self {
            shared: Arc::new(RelayShared {
                queue: AsyncQueue::with_capacity(config.queue_capacity),
                upstream: Mutex::new(Weak::new()),
            }),
            bus: Bus::with_config(&config.bus),
        }
    }

    /// Connects a local callable for `T`.
    pub fn connect<T, F>(&self, callback: F) -> ConnectionHandle
    where
        T: Event,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.bus.connect(callback)
    }

    /// Connects a local stateful subscriber for `T`.
    ///
    /// # Errors
    /// See [`Bus::connect_subscriber`].
    pub fn connect_subscriber<T, S>(&self, subscriber: &Arc<S>) -> Result<ConnectionHandle>
    where
        T: Event,
        S: Receive<T>,
    {
        self.bus.connect_subscriber::<T, S>(subscriber)
    }

    /// Removes a local callable.
    pub fn disconnect<T: Event>(&self, handle: ConnectionHandle) {
        self.bus.disconnect::<T>(handle);
    }

    /// Pre-sizes the buffer for `T`.
    pub fn reserve<T: Event>(&self, additional: usize) {
        self.shared.queue.reserve::<T>(additional);
    }

    /// Delivers everything queued since the previous dispatch to the local
    /// subscribers, synchronously on the calling thread.
    ///
    /// Must not run concurrently with itself on the same relay.
    ///
    /// # Examples
    /// ```rust
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use tybus_events::{Bus, Relay};
    ///
    /// #[derive(Clone)]
    /// struct Ping;
    ///
    /// let bus = Bus::new();
    /// let relay = Relay::new();
    /// bus.connect_relay(&relay).unwrap();
    ///
    /// let pings = Arc::new(AtomicUsize::new(0));
    /// let sink = Arc::clone(&pings);
    /// relay.connect(move |_: &mut Ping| {
    ///     sink.fetch_add(1, Ordering::SeqCst);
    /// });
    ///
    /// bus.emit(Ping);
    /// bus.emit(Ping);
    /// relay.dispatch();
    /// assert_eq!(pings.load(Ordering::SeqCst), 2);
    ///
    /// relay.dispatch();
    /// assert_eq!(pings.load(Ordering::SeqCst), 2);
    /// ```
    pub fn dispatch(&self) {
        let delivered = self.shared.queue.sync_and_emit_events(&self.bus);
        trace!(delivered, "Relay dispatched");
    }

    /// Alias of [`dispatch`](Self::dispatch).
    pub fn flush(&self) {
        self.dispatch();
    }

    /// Whether the relay is currently attached to an upstream bus.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared.upstream.lock().strong_count() > 0
    }

    /// The private bus local subscribers are connected to.
    ///
    /// Relays can be chained by attaching another relay to it.
    #[must_use]
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The underlying queue.
    #[must_use]
    pub fn queue(&self) -> &AsyncQueue {
        &self.shared.queue
    }

    pub(crate) const fn shared(&self) -> &Arc<RelayShared> {
        &self.shared
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay").field("shared", &self.shared).field("bus", &self.bus).finish()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let upstream = self.shared.upstream.lock().upgrade();
        if let Some(bus) = upstream
            && let Err(err) = bus.detach_relay(&self.shared)
        {
            // The upstream bus released us between the upgrade and the detach.
            debug!(%err, "Relay already released by its upstream bus");
        }
    }
}
