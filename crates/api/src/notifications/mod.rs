//! Notification delivery driven by platform events.

pub mod router;

pub use router::NotificationRouter;
