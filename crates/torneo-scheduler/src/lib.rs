//! # Torneo Scheduler
//! Polls the notification table on a fixed interval, resolves each due row's
//! recipient specifier, delivers DMs best-effort, and retires the row.
//!
//! Delivery is at-most-once: the row is deleted after the attempts complete
//! no matter how many succeeded. A crash between delivery and deletion can
//! duplicate a send on restart; that trade-off is deliberate.

pub mod engine;

pub use engine::{NotificationScheduler, TickReport, spawn_scheduler};
