//! Campus event bus and notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope.
//! - [`BusObserver`]: forwards committed journey transitions onto the bus.
//! - [`ActivityPersistence`]: writes every bus event to `activity_logs`.
//! - [`Notifier`]: bounded pool of SMTP workers for fire-and-forget email.

pub mod bus;
pub mod notifier;
pub mod observer;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use notifier::{EmailConfig, EmailError, Notification, Notifier};
pub use observer::BusObserver;
pub use persistence::ActivityPersistence;
