//! List-changed notifications.
//!
//! Whenever the set of components a client can see may have changed, the
//! router emits one notification per affected kind to the current session.
//! Resources and resource templates share a single notification.
//!
//! Delivery is best effort: with no active session the notification is
//! dropped, and send failures are logged at debug level and swallowed.

use crate::component::ComponentKind;
use crate::context::{CallContext, Session};
use crate::error::SessionError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A list-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Notification {
    /// The tool list changed
    #[serde(rename = "notifications/tools/list_changed")]
    ToolListChanged,
    /// The resource or resource template list changed
    #[serde(rename = "notifications/resources/list_changed")]
    ResourceListChanged,
    /// The prompt list changed
    #[serde(rename = "notifications/prompts/list_changed")]
    PromptListChanged,
}

impl Notification {
    /// Returns the notification for a component kind.
    ///
    /// ```
    /// use mcp_router::component::ComponentKind;
    /// use mcp_router::notify::Notification;
    ///
    /// assert_eq!(
    ///     Notification::for_kind(ComponentKind::Template),
    ///     Notification::ResourceListChanged
    /// );
    /// ```
    pub fn for_kind(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Tool => Notification::ToolListChanged,
            ComponentKind::Resource | ComponentKind::Template => Notification::ResourceListChanged,
            ComponentKind::Prompt => Notification::PromptListChanged,
        }
    }

    /// Returns the JSON-RPC method name.
    pub fn method(&self) -> &'static str {
        match self {
            Notification::ToolListChanged => "notifications/tools/list_changed",
            Notification::ResourceListChanged => "notifications/resources/list_changed",
            Notification::PromptListChanged => "notifications/prompts/list_changed",
        }
    }
}

/// Collapses kinds into the distinct notifications they map to, in
/// tool, resource, prompt order.
pub fn notifications_for(kinds: impl IntoIterator<Item = ComponentKind>) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = kinds.into_iter().map(Notification::for_kind).collect();
    notifications.sort();
    notifications.dedup();
    notifications
}

/// Returns true if the current call carries a session to notify.
pub fn session_attached() -> bool {
    CallContext::current().is_some_and(|ctx| ctx.session().is_some())
}

/// Sends the notifications for `kinds` to the current session.
///
/// Returns how many notifications were delivered.
pub fn dispatch(kinds: impl IntoIterator<Item = ComponentKind>) -> usize {
    let notifications = notifications_for(kinds);
    if notifications.is_empty() {
        return 0;
    }

    let session = match CallContext::current().and_then(|ctx| ctx.session().cloned()) {
        Some(session) => session,
        None => {
            debug!(count = notifications.len(), "No active session, dropping notifications");
            return 0;
        }
    };

    let mut delivered = 0;
    for notification in notifications {
        match session.send_notification(notification) {
            Ok(()) => delivered += 1,
            Err(e) => debug!(
                session = session.id(),
                method = notification.method(),
                error = %e,
                "Failed to send notification"
            ),
        }
    }
    delivered
}

/// In-memory session that records notifications.
///
/// # Examples
///
/// ```
/// use mcp_router::component::ComponentKind;
/// use mcp_router::context::CallContext;
/// use mcp_router::notify::{dispatch, MockSession, Notification};
///
/// # tokio_test::block_on(async {
/// let session = MockSession::new("s1");
/// let context = CallContext::builder().session(session.clone()).build();
///
/// CallContext::scope(context, async {
///     dispatch([ComponentKind::Resource, ComponentKind::Template]);
/// })
/// .await;
///
/// assert_eq!(session.notifications(), vec![Notification::ResourceListChanged]);
/// # });
/// ```
#[derive(Debug)]
pub struct MockSession {
    id: String,
    sent: Mutex<Vec<Notification>>,
    closed: Mutex<bool>,
}

impl MockSession {
    /// Creates a session with the given identifier.
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        })
    }

    /// Returns every notification received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Returns how many times `notification` was received.
    pub fn count(&self, notification: Notification) -> usize {
        self.sent.lock().iter().filter(|n| **n == notification).count()
    }

    /// Forgets recorded notifications.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Makes subsequent sends fail.
    pub fn close(&self) {
        *self.closed.lock() = true;
    }
}

impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_notification(&self, notification: Notification) -> Result<(), SessionError> {
        if *self.closed.lock() {
            return Err(SessionError::Closed);
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}
