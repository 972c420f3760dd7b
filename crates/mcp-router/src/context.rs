//! Request-scoped call context.
//!
//! A [`CallContext`] carries the active session, request identifier and
//! client details through a request. The router reads it to pick
//! session-scoped visibility rules and to route list-changed notifications.
//!
//! The context is bound to the running task with [`CallContext::scope`] and
//! read back with [`CallContext::current`]. Code running outside any scope
//! sees no context, which is how "no active session" is represented.

use crate::error::SessionError;
use crate::notify::Notification;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT: CallContext;
}

/// A connected client session.
///
/// Implemented by the transport layer; the router only needs an identifier
/// and a way to push notifications.
pub trait Session: Send + Sync {
    /// Stable session identifier.
    fn id(&self) -> &str;

    /// Delivers a notification to the client.
    fn send_notification(&self, notification: Notification) -> Result<(), SessionError>;
}

/// Context information available while a request is served.
///
/// # Examples
///
/// ```
/// use mcp_router::context::CallContext;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let context = CallContext::builder()
///     .request_id(json!(7))
///     .client_info("my-client", "1.0.0")
///     .build();
///
/// CallContext::scope(context, async {
///     let current = CallContext::current().unwrap();
///     assert_eq!(current.request_id(), Some(&json!(7)));
/// })
/// .await;
///
/// assert!(CallContext::current().is_none());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct CallContext {
    session: Option<Arc<dyn Session>>,
    request_id: Option<Value>,
    client_name: Option<String>,
    client_version: Option<String>,
    metadata: Arc<HashMap<String, Value>>,
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("session_id", &self.session_id())
            .field("request_id", &self.request_id)
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl CallContext {
    /// Creates an empty context with no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// Returns a copy of the context bound to the current task, if any.
    pub fn current() -> Option<CallContext> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Runs `future` with `context` bound as the current context.
    pub async fn scope<F: Future>(context: CallContext, future: F) -> F::Output {
        CURRENT.scope(context, future).await
    }

    /// Returns the session, if any.
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Returns the session identifier, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref().map(|session| session.id())
    }

    /// Returns the request ID.
    pub fn request_id(&self) -> Option<&Value> {
        self.request_id.as_ref()
    }

    /// Returns the client name.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Returns the client version.
    pub fn client_version(&self) -> Option<&str> {
        self.client_version.as_deref()
    }

    /// Returns the metadata map.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Gets a metadata value by key.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Builder for [`CallContext`].
#[derive(Default)]
pub struct CallContextBuilder {
    session: Option<Arc<dyn Session>>,
    request_id: Option<Value>,
    client_name: Option<String>,
    client_version: Option<String>,
    metadata: HashMap<String, Value>,
}

impl CallContextBuilder {
    /// Attaches a session.
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the JSON-RPC request ID.
    pub fn request_id(mut self, id: Value) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Sets the client information.
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self.client_version = Some(version.into());
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the context.
    pub fn build(self) -> CallContext {
        CallContext {
            session: self.session,
            request_id: self.request_id,
            client_name: self.client_name,
            client_version: self.client_version,
            metadata: Arc::new(self.metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockSession;
    use serde_json::json;

    #[test]
    fn test_new_context_is_empty() {
        let context = CallContext::new();
        assert!(context.session().is_none());
        assert!(context.session_id().is_none());
        assert!(context.metadata().is_empty());
    }

    #[test]
    fn test_builder() {
        let session = MockSession::new("s1");
        let context = CallContext::builder()
            .session(session)
            .client_info("client", "0.1")
            .metadata("user_id", json!(42))
            .build();

        assert_eq!(context.session_id(), Some("s1"));
        assert_eq!(context.client_name(), Some("client"));
        assert_eq!(context.client_version(), Some("0.1"));
        assert_eq!(context.get_metadata("user_id"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_scope_binds_current() {
        assert!(CallContext::current().is_none());

        let context = CallContext::builder().session(MockSession::new("abc")).build();
        let seen = CallContext::scope(context, async {
            CallContext::current().and_then(|c| c.session_id().map(str::to_string))
        })
        .await;

        assert_eq!(seen.as_deref(), Some("abc"));
        assert!(CallContext::current().is_none());
    }

    #[tokio::test]
    async fn test_nested_scope_shadows() {
        let outer = CallContext::builder().session(MockSession::new("outer")).build();
        let inner = CallContext::builder().session(MockSession::new("inner")).build();

        CallContext::scope(outer, async move {
            CallContext::scope(inner, async {
                assert_eq!(CallContext::current().unwrap().session_id(), Some("inner"));
            })
            .await;
            assert_eq!(CallContext::current().unwrap().session_id(), Some("outer"));
        })
        .await;
    }
}
