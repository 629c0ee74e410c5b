//! Background tasks module
//!
//! Tasks that run alongside the HTTP server: the alarm loop, and the
//! consumers of the authoritative timer stream.

pub mod alarm_loop;
pub mod notification_relay;
pub mod session_sync;

pub use alarm_loop::{spawn_alarm, AlarmCadence, AlarmHandle};
pub use notification_relay::notification_relay_task;
pub use session_sync::session_sync_task;
