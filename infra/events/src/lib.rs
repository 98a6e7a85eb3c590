//! # Event Bus
//!
//! An in-process, type-safe publish/subscribe event bus with synchronous dispatch
//! and a buffered hand-off between threads.
//!
//! ## Overview
//!
//! A [`Bus`] keeps one signal per event type, addressed by a process-wide
//! [`EventTypeIndex`]. Emitting an event runs every connected callable on the
//! calling thread and then queues a copy of it on every attached [`Relay`]. A relay
//! owns a double-buffered [`AsyncQueue`] and a private bus; calling
//! [`Relay::dispatch`] on the consumer thread replays everything queued since the
//! previous dispatch to the relay's own subscribers.
//!
//! ## Features
//!
//! * **Type-Safe**: Events are identified by their Rust type.
//! * **Two kinds of subscribers**: plain callables, removed by [`ConnectionHandle`],
//!   and stateful objects embedding a [`Subscription`] that disconnects itself on drop.
//! * **Either side may die first**: dropping a bus invalidates its subscribers and
//!   relays, dropping those detaches them from the bus.
//! * **High Performance**: `FxHashMap` + `parking_lot` locks, no lock held while
//!   callables run.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use tybus_events::{Bus, BusError, Relay};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct UserCreated { id: u64 }
//!
//! fn main() -> Result<(), BusError> {
//!     let bus = Bus::new();
//!     let relay = Relay::new();
//!     bus.connect_relay(&relay)?;
//!
//!     let last = Arc::new(AtomicU64::new(0));
//!     let sink = Arc::clone(&last);
//!     relay.connect(move |event: &mut UserCreated| sink.store(event.id, Ordering::SeqCst));
//!
//!     bus.emit(UserCreated { id: 42 });
//!     assert_eq!(last.load(Ordering::SeqCst), 0);
//!
//!     relay.dispatch();
//!     assert_eq!(last.load(Ordering::SeqCst), 42);
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod error;
mod queue;
mod relay;
mod signal;
mod subscriber;
mod type_index;

pub use bus::{Bus, Event};
pub use config::{BusConfig, RelayConfig};
pub use error::{BusError, BusErrorExt, Result};
pub use queue::AsyncQueue;
pub use relay::Relay;
pub use signal::ConnectionHandle;
pub use subscriber::{Receive, Subscriber, Subscription};
pub use type_index::{EventTypeIndex, registered_types, type_index};
