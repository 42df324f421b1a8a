//! # Shared Bus - Rack Connection Notifications
//!
//! The connection registry announces every rack connection that joins or
//! leaves through this bus. Consumers (metrics, service monitors, audit
//! logging) subscribe with a filter and never touch registry state directly.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │   Registry   │ ────────────▶ │  Event Bus   │ ────────────▶ │   Consumer   │
//! └──────────────┘               └──────────────┘               └──────────────┘
//! ```
//!
//! ## Semantics
//!
//! - `Disconnected` names the *connection* that left. It is published even
//!   when the identity still has other live connections.
//! - Events for one identity are delivered in the order they were published.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventKind, RackEvent};
pub use publisher::{EventPublisher, InMemoryEventBus, NoOpEventPublisher};
pub use subscriber::{EventStream, Subscription};

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
