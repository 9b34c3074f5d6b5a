use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Owning identity for remote records. Opaque to this crate; the record
/// service hands it out at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserId),
    SignedOut,
}

/// Supplies the current identity and a stream of sign-in/sign-out
/// transitions. The repository consumes both; everything else about
/// authentication lives outside this crate.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Session>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Identity pinned at startup from configuration. The CLI has no runtime
/// auth flow, so the event channel stays silent; scripted providers in
/// tests are the ones that actually publish.
pub struct ConfigIdentity {
    session: Option<Session>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConfigIdentity {
    pub fn new(user_id: Option<UserId>) -> Self {
        let (events, _) = broadcast::channel(8);
        let session = user_id.map(|user_id| {
            debug!(user = %user_id, "using configured identity");
            Session { user_id }
        });
        Self { session, events }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }
}

impl IdentityProvider for ConfigIdentity {
    fn current(&self) -> Option<Session> {
        self.session.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
