//! Proxying to another server.
//!
//! A [`ProxyProvider`] turns the wire definitions of an [`Upstream`] into
//! local components whose handlers forward every call. Components registered
//! locally on the proxy shadow upstream components with the same key.
//!
//! [`SharedConnection`] lets many callers share one upstream connection: the
//! first entrant connects, later entrants reuse it, and the connection is
//! closed when the last holder leaves.

use super::Provider;
use crate::component::{
    Arguments, Component, Prompt, PromptDefinition, PromptMessage, PromptRenderer, Resource, ResourceContent,
    ResourceDefinition, ResourceReader, ResourceTemplate, TemplateDefinition, TemplateParams, TemplateReader, Tool,
    ToolDefinition, ToolHandler, ToolOutput, ToolResult, UriTemplate,
};
use crate::context::CallContext;
use crate::error::{PromptError, ProviderError, RegistryError, ResourceError, ToolError};
use crate::registry::LocalRegistry;
use crate::router::Router;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// A remote server, seen through its definitions and call operations.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Lists tool definitions.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError>;

    /// Lists resource definitions.
    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, ProviderError>;

    /// Lists resource template definitions.
    async fn list_resource_templates(&self) -> Result<Vec<TemplateDefinition>, ProviderError>;

    /// Lists prompt definitions.
    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, ProviderError>;

    /// Calls a tool.
    async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<ToolResult, ToolError>;

    /// Reads a resource.
    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError>;

    /// Renders a prompt.
    async fn render_prompt(&self, name: &str, arguments: Arguments) -> Result<Vec<PromptMessage>, PromptError>;
}

/// Provider backed by an [`Upstream`], with local overrides.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{Component, Tool};
/// use mcp_router::context::CallContext;
/// use mcp_router::provider::{InProcessUpstream, Provider, ProxyProvider};
/// use mcp_router::router::Router;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let remote = Router::new("remote");
/// remote
///     .add_tool(Tool::from_fn("echo", json!({"type": "object"}), |args| async move {
///         Ok(args.get("text").cloned().unwrap_or_default())
///     }))
///     .unwrap();
///
/// let proxy = ProxyProvider::new("remote", InProcessUpstream::new(remote));
/// let tool = proxy.get_tool("echo").await.unwrap().unwrap();
///
/// let args = json!({"text": "hi"}).as_object().cloned().unwrap();
/// let result = tool.run(args, &CallContext::new()).await.unwrap();
/// assert_eq!(result.first_text(), Some("hi"));
/// # });
/// ```
#[derive(Clone)]
pub struct ProxyProvider {
    name: String,
    upstream: Arc<dyn Upstream>,
    local: LocalRegistry,
}

impl fmt::Debug for ProxyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyProvider")
            .field("name", &self.name)
            .field("local", &self.local)
            .finish()
    }
}

impl ProxyProvider {
    /// Creates a proxy for `upstream`.
    pub fn new<U: Upstream + 'static>(name: impl Into<String>, upstream: U) -> Self {
        Self::from_arc(name, Arc::new(upstream))
    }

    /// Creates a proxy for a shared upstream.
    pub fn from_arc(name: impl Into<String>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            name: name.into(),
            upstream,
            local: LocalRegistry::new(),
        }
    }

    /// Returns the registry of local overrides.
    pub fn local(&self) -> &LocalRegistry {
        &self.local
    }

    /// Registers a tool that shadows the upstream tool with the same key.
    pub fn add_tool(&self, tool: Tool) -> Result<Tool, RegistryError> {
        self.local.add_tool(tool)
    }

    /// Registers a resource that shadows the upstream resource with the same key.
    pub fn add_resource(&self, resource: Resource) -> Result<Resource, RegistryError> {
        self.local.add_resource(resource)
    }

    /// Registers a template that shadows the upstream template with the same key.
    pub fn add_template(&self, template: ResourceTemplate) -> Result<ResourceTemplate, RegistryError> {
        self.local.add_template(template)
    }

    /// Registers a prompt that shadows the upstream prompt with the same key.
    pub fn add_prompt(&self, prompt: Prompt) -> Result<Prompt, RegistryError> {
        self.local.add_prompt(prompt)
    }

    fn remote_tool(&self, definition: ToolDefinition) -> Tool {
        let handler = Arc::new(RemoteTool {
            upstream: self.upstream.clone(),
            name: definition.name.clone(),
        });
        Tool::from_definition(definition, handler)
    }

    fn remote_resource(&self, definition: ResourceDefinition) -> Resource {
        let reader = Arc::new(RemoteResource {
            upstream: self.upstream.clone(),
            uri: definition.uri.clone(),
        });
        Resource::from_definition(definition, reader)
    }

    fn remote_template(&self, definition: TemplateDefinition) -> Result<ResourceTemplate, ProviderError> {
        let template =
            UriTemplate::parse(definition.uri_template.clone()).map_err(|e| ProviderError::Upstream(e.into()))?;
        let reader = Arc::new(RemoteTemplate {
            upstream: self.upstream.clone(),
            template,
        });
        ResourceTemplate::from_definition(definition, reader).map_err(|e| ProviderError::Upstream(e.into()))
    }

    fn remote_prompt(&self, definition: PromptDefinition) -> Prompt {
        let renderer = Arc::new(RemotePrompt {
            upstream: self.upstream.clone(),
            name: definition.name.clone(),
        });
        Prompt::from_definition(definition, renderer)
    }
}

/// Appends the remote components not shadowed locally. A local component
/// shadows every remote version of the same name or URI.
fn shadow<T: Component>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let identifiers: HashSet<String> = local.iter().map(|c| c.key().identifier().to_string()).collect();
    let mut merged = local;
    merged.extend(
        remote
            .into_iter()
            .filter(|component| !identifiers.contains(component.key().identifier())),
    );
    merged
}

#[async_trait]
impl Provider for ProxyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        let local = self.local.list_tools().await?;
        let remote = self.upstream.list_tools().await?;
        let remote = remote.into_iter().map(|d| self.remote_tool(d)).collect();
        Ok(shadow(local, remote))
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        let local = self.local.list_resources().await?;
        let remote = self.upstream.list_resources().await?;
        let remote = remote.into_iter().map(|d| self.remote_resource(d)).collect();
        Ok(shadow(local, remote))
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        let local = self.local.list_resource_templates().await?;
        let remote = self.upstream.list_resource_templates().await?;
        let remote = remote
            .into_iter()
            .map(|d| self.remote_template(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shadow(local, remote))
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        let local = self.local.list_prompts().await?;
        let remote = self.upstream.list_prompts().await?;
        let remote = remote.into_iter().map(|d| self.remote_prompt(d)).collect();
        Ok(shadow(local, remote))
    }
}

struct RemoteTool {
    upstream: Arc<dyn Upstream>,
    name: String,
}

#[async_trait]
impl ToolHandler for RemoteTool {
    async fn call(&self, arguments: Arguments, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let result = self.upstream.call_tool(&self.name, arguments).await?;
        Ok(result.into())
    }
}

struct RemoteResource {
    upstream: Arc<dyn Upstream>,
    uri: String,
}

#[async_trait]
impl ResourceReader for RemoteResource {
    async fn read(&self, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        self.upstream.read_resource(&self.uri).await
    }
}

struct RemoteTemplate {
    upstream: Arc<dyn Upstream>,
    template: UriTemplate,
}

#[async_trait]
impl TemplateReader for RemoteTemplate {
    async fn read(&self, params: &TemplateParams, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        let uri = self
            .template
            .expand(params)
            .ok_or_else(|| ResourceError::InvalidUri(format!("cannot expand {}", self.template)))?;
        self.upstream.read_resource(&uri).await
    }
}

struct RemotePrompt {
    upstream: Arc<dyn Upstream>,
    name: String,
}

#[async_trait]
impl PromptRenderer for RemotePrompt {
    async fn render(&self, arguments: Arguments, _ctx: &CallContext) -> Result<Vec<PromptMessage>, PromptError> {
        self.upstream.render_prompt(&self.name, arguments).await
    }
}

/// An [`Upstream`] served by a router in the same process.
///
/// Calls run under the caller's context, so session-scoped visibility of
/// the remote router follows the caller's session.
#[derive(Debug, Clone)]
pub struct InProcessUpstream {
    router: Router,
}

impl InProcessUpstream {
    /// Wraps a router.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Returns the wrapped router.
    pub fn router(&self) -> &Router {
        &self.router
    }
}

#[async_trait]
impl Upstream for InProcessUpstream {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        Ok(self.router.list_tools().await.iter().map(Tool::to_definition).collect())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, ProviderError> {
        Ok(self.router.list_resources().await.iter().map(Resource::to_definition).collect())
    }

    async fn list_resource_templates(&self) -> Result<Vec<TemplateDefinition>, ProviderError> {
        Ok(self
            .router
            .list_resource_templates()
            .await
            .iter()
            .map(ResourceTemplate::to_definition)
            .collect())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, ProviderError> {
        Ok(self.router.list_prompts().await.iter().map(Prompt::to_definition).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<ToolResult, ToolError> {
        self.router.call_tool(name, arguments).await
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        self.router.read_resource(uri).await
    }

    async fn render_prompt(&self, name: &str, arguments: Arguments) -> Result<Vec<PromptMessage>, PromptError> {
        self.router.render_prompt(name, arguments).await
    }
}

/// Opens and closes upstream connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The live connection.
    type Connection: Send + Sync + 'static;

    /// Opens a connection.
    async fn connect(&self) -> Result<Self::Connection, ProviderError>;

    /// Closes a connection once no holder is left.
    async fn disconnect(&self, connection: Arc<Self::Connection>);
}

struct SharedState<T> {
    connection: Option<Arc<T>>,
    holders: usize,
}

struct SharedInner<C: Connector> {
    connector: C,
    state: Mutex<SharedState<C::Connection>>,
    // Serializes connection attempts; never held by connected holders.
    connecting: tokio::sync::Mutex<()>,
}

/// A reference-counted connection shared by concurrent entrants.
///
/// [`acquire`](Self::acquire) connects on first use and hands out a
/// [`ConnectionGuard`]; dropping the last guard closes the connection. An
/// entrant cancelled while the connection is still being opened gives up
/// its attempt without touching a connection other holders use.
///
/// # Examples
///
/// ```
/// use mcp_router::error::ProviderError;
/// use mcp_router::provider::{Connector, SharedConnection};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Dialer;
///
/// #[async_trait]
/// impl Connector for Dialer {
///     type Connection = String;
///
///     async fn connect(&self) -> Result<String, ProviderError> {
///         Ok("connected".to_string())
///     }
///
///     async fn disconnect(&self, _connection: Arc<String>) {}
/// }
///
/// # tokio_test::block_on(async {
/// let shared = SharedConnection::new(Dialer);
/// let first = shared.acquire().await.unwrap();
/// let second = shared.acquire().await.unwrap();
/// assert_eq!(shared.holders(), 2);
/// assert_eq!(first.as_str(), "connected");
///
/// drop(first);
/// assert!(shared.is_connected());
/// drop(second);
/// assert!(!shared.is_connected());
/// # });
/// ```
pub struct SharedConnection<C: Connector> {
    inner: Arc<SharedInner<C>>,
}

impl<C: Connector> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for SharedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SharedConnection")
            .field("connected", &state.connection.is_some())
            .field("holders", &state.holders)
            .finish()
    }
}

impl<C: Connector> SharedConnection<C> {
    /// Creates an unconnected handle.
    pub fn new(connector: C) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                connector,
                state: Mutex::new(SharedState {
                    connection: None,
                    holders: 0,
                }),
                connecting: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Enters the connection, opening it if nobody holds it.
    ///
    /// # Errors
    ///
    /// The connector's error when opening fails. Existing holders are not
    /// affected.
    pub async fn acquire(&self) -> Result<ConnectionGuard<C>, ProviderError> {
        if let Some(guard) = self.join_existing() {
            return Ok(guard);
        }

        let _connecting = self.inner.connecting.lock().await;
        if let Some(guard) = self.join_existing() {
            return Ok(guard);
        }

        let connection = Arc::new(self.inner.connector.connect().await?);
        let mut state = self.inner.state.lock();
        state.connection = Some(connection.clone());
        state.holders += 1;
        debug!(holders = state.holders, "Opened shared connection");
        Ok(ConnectionGuard {
            shared: self.inner.clone(),
            connection,
        })
    }

    /// Returns how many guards are alive.
    pub fn holders(&self) -> usize {
        self.inner.state.lock().holders
    }

    /// Returns `true` while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connection.is_some()
    }

    fn join_existing(&self) -> Option<ConnectionGuard<C>> {
        let mut state = self.inner.state.lock();
        let connection = state.connection.clone()?;
        state.holders += 1;
        Some(ConnectionGuard {
            shared: self.inner.clone(),
            connection,
        })
    }
}

/// A live hold on a [`SharedConnection`].
pub struct ConnectionGuard<C: Connector> {
    shared: Arc<SharedInner<C>>,
    connection: Arc<C::Connection>,
}

impl<C: Connector> Deref for ConnectionGuard<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl<C: Connector> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        let closing = {
            let mut state = self.shared.state.lock();
            state.holders = state.holders.saturating_sub(1);
            if state.holders == 0 {
                state.connection.take()
            } else {
                None
            }
        };

        let Some(connection) = closing else {
            return;
        };
        debug!("Last holder left, closing shared connection");
        let shared = self.shared.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    shared.connector.disconnect(connection).await;
                });
            }
            Err(_) => debug!("No runtime available, dropping connection without disconnect"),
        }
    }
}

#[async_trait]
impl<C> Upstream for SharedConnection<C>
where
    C: Connector,
    C::Connection: Upstream,
{
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        let connection = self.acquire().await?;
        connection.list_tools().await
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, ProviderError> {
        let connection = self.acquire().await?;
        connection.list_resources().await
    }

    async fn list_resource_templates(&self) -> Result<Vec<TemplateDefinition>, ProviderError> {
        let connection = self.acquire().await?;
        connection.list_resource_templates().await
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, ProviderError> {
        let connection = self.acquire().await?;
        connection.list_prompts().await
    }

    async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let connection = self.acquire().await?;
        connection.call_tool(name, arguments).await
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        let connection = self.acquire().await?;
        connection.read_resource(uri).await
    }

    async fn render_prompt(&self, name: &str, arguments: Arguments) -> Result<Vec<PromptMessage>, PromptError> {
        let connection = self.acquire().await?;
        connection.render_prompt(name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::PromptArgument;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn remote() -> Router {
        let router = Router::new("remote");
        router
            .add_tool(Tool::from_fn("echo", json!({"type": "object"}), |args| async move {
                Ok(args.get("text").cloned().unwrap_or_default())
            }))
            .unwrap();
        router
            .add_tool(Tool::from_fn("shared", json!({"type": "object"}), |_| async { Ok(json!("remote")) }))
            .unwrap();
        router.add_resource(Resource::text("data://motd", "hello")).unwrap();
        router
            .add_template(
                ResourceTemplate::from_fn("users://{id}", |params| async move {
                    Ok(ResourceContent::text(format!("user {}", params["id"]), "text/plain"))
                })
                .unwrap(),
            )
            .unwrap();
        router
            .add_prompt(
                Prompt::from_fn("greet", |args| async move {
                    let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("world").to_string();
                    Ok(vec![PromptMessage::user(format!("Hello {}", name))])
                })
                .with_argument(PromptArgument::required("name")),
            )
            .unwrap();
        router
    }

    #[tokio::test]
    async fn test_proxy_lists_upstream() {
        let proxy = ProxyProvider::new("remote", InProcessUpstream::new(remote()));
        assert_eq!(proxy.list_tools().await.unwrap().len(), 2);
        assert_eq!(proxy.list_resources().await.unwrap().len(), 1);
        assert_eq!(proxy.list_resource_templates().await.unwrap().len(), 1);

        let prompts = proxy.list_prompts().await.unwrap();
        assert_eq!(prompts[0].arguments().len(), 1);
    }

    #[tokio::test]
    async fn test_proxy_forwards_reads() {
        let proxy = ProxyProvider::new("remote", InProcessUpstream::new(remote()));
        let ctx = CallContext::new();

        let resource = proxy.get_resource("data://motd").await.unwrap().unwrap();
        assert_eq!(resource.read(&ctx).await.unwrap().as_text(), Some("hello"));

        let template = proxy.get_resource_template("users://9").await.unwrap().unwrap();
        assert_eq!(template.read("users://9", &ctx).await.unwrap().as_text(), Some("user 9"));

        let prompt = proxy.get_prompt("greet").await.unwrap().unwrap();
        let args = json!({"name": "Ada"}).as_object().cloned().unwrap();
        let messages = prompt.render(args, &ctx).await.unwrap();
        assert_eq!(messages[0].content.as_text(), Some("Hello Ada"));
    }

    #[tokio::test]
    async fn test_local_override_wins() {
        let proxy = ProxyProvider::new("remote", InProcessUpstream::new(remote()));
        proxy
            .add_tool(Tool::from_fn("shared", json!({"type": "object"}), |_| async { Ok(json!("local")) }))
            .unwrap();

        let tools = proxy.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);

        let tool = proxy.get_tool("shared").await.unwrap().unwrap();
        let result = tool.run(Arguments::new(), &CallContext::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("local"));
    }

    #[tokio::test]
    async fn test_unversioned_override_shadows_versioned_upstream() {
        let upstream = remote();
        upstream
            .add_tool(
                Tool::from_fn("pinned", json!({"type": "object"}), |_| async { Ok(json!("remote 2.0")) })
                    .with_version("2.0"),
            )
            .unwrap();
        let proxy = ProxyProvider::new("remote", InProcessUpstream::new(upstream));
        proxy
            .add_tool(Tool::from_fn("pinned", json!({"type": "object"}), |_| async { Ok(json!("local")) }))
            .unwrap();

        let pinned: Vec<Tool> = proxy
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .filter(|tool| tool.name() == "pinned")
            .collect();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].version(), None);

        let tool = proxy.get_tool("pinned").await.unwrap().unwrap();
        let result = tool.run(Arguments::new(), &CallContext::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("local"));
    }

    #[tokio::test]
    async fn test_upstream_tool_error_propagates() {
        let proxy = ProxyProvider::new("remote", InProcessUpstream::new(remote()));
        let upstream = InProcessUpstream::new(remote());
        let error = upstream.call_tool("missing", Arguments::new()).await.unwrap_err();
        assert!(matches!(error, ToolError::NotFound(_)));
        assert!(proxy.get_tool("missing").await.unwrap().is_none());
    }

    struct CountingConnector {
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Connection = InProcessUpstream;

        async fn connect(&self) -> Result<InProcessUpstream, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(InProcessUpstream::new(remote()))
        }

        async fn disconnect(&self, _connection: Arc<InProcessUpstream>) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(delay: Duration) -> (SharedConnection<CountingConnector>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let shared = SharedConnection::new(CountingConnector {
            connects: connects.clone(),
            disconnects: disconnects.clone(),
            delay,
        });
        (shared, connects, disconnects)
    }

    #[tokio::test]
    async fn test_concurrent_entrants_share_one_connection() {
        let (shared, connects, disconnects) = counting(Duration::from_millis(20));

        let (a, b) = tokio::join!(shared.acquire(), shared.acquire());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(shared.holders(), 2);

        drop(a);
        assert!(shared.is_connected());
        drop(b);
        assert!(!shared.is_connected());

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_entrant_does_not_tear_down() {
        let (shared, connects, _disconnects) = counting(Duration::from_millis(50));

        let holder = shared.clone();
        let long_lived = tokio::spawn(async move {
            let guard = holder.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(guard);
        });

        // Give up while the connection is still opening.
        let cancelled = tokio::time::timeout(Duration::from_millis(10), shared.acquire()).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shared.is_connected());
        assert_eq!(shared.holders(), 1);

        long_lived.await.unwrap();
        assert!(!shared.is_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shared_connection_as_upstream() {
        let (shared, connects, _) = counting(Duration::ZERO);
        let proxy = ProxyProvider::new("pooled", shared.clone());

        let tools = proxy.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        let tool = proxy.get_tool("echo").await.unwrap().unwrap();
        let args = json!({"text": "pooled"}).as_object().cloned().unwrap();
        let result = tool.run(args, &CallContext::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("pooled"));

        assert_eq!(shared.holders(), 0);
        assert!(connects.load(Ordering::SeqCst) >= 1);
    }
}
