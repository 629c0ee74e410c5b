//! Host adapters
//!
//! Everything the timer needs from the machine it runs on: a grant to keep
//! running in the background, alert sounds, a notification surface, and a
//! session file for resumption.

pub mod alert;
pub mod grant;
pub mod notification;
pub mod session;

pub use alert::{AlertSink, Sound, SoundAlerts};
pub use grant::{DurableGrant, ProcessGrant, SystemdInhibitGrant};
pub use notification::{
    DesktopNotifier, LogNotifier, NotificationAction, NotificationContent, NotificationSurface,
};
pub use session::{SessionRecord, SessionStore};
