//! Session lifecycle notifications.
//!
//! The UI layer subscribes to these to react to a torn-down session (the
//! browser client redirected to the login page at this point).

use tokio::sync::broadcast;

use crate::models::User;

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    Registered(User),
    /// A refresh exchange produced a new access token.
    Refreshed,
    LoggedOut,
    /// The refresh exchange failed and all credentials were dropped.
    Expired { redirect_to: String },
}

pub fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publishes `event`; having no subscribers is not an error.
pub fn emit(sender: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    let _ = sender.send(event);
}
