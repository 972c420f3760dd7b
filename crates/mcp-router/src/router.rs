//! The router: one surface over an ordered list of providers.
//!
//! Provider `0` is the router's own [`LocalRegistry`]; mounted providers
//! follow in registration order. Listings concatenate every provider's
//! components in that order without de-duplication. Lookups and calls take
//! the first provider, in registration order, that has an enabled match.
//! This "first registered wins" rule is separate from the registry's own
//! duplicate policy.
//!
//! Providers are queried concurrently. A provider that fails or does not
//! answer within the configured timeout is logged and treated as having
//! contributed nothing.
//!
//! Every listing and lookup is filtered through the visibility rules: the
//! global rules, then the rules of the session in the current
//! [`CallContext`].
//!
//! # Examples
//!
//! ```
//! use mcp_router::component::{Component, Tool};
//! use mcp_router::router::Router;
//! use mcp_router::visibility::RuleMatch;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let router = Router::new("demo");
//! router
//!     .add_tool(Tool::from_fn("greet", json!({"type": "object"}), |_| async {
//!         Ok(json!("hello"))
//!     }))
//!     .unwrap();
//!
//! let result = router.call_tool("greet", Default::default()).await.unwrap();
//! assert_eq!(result.first_text(), Some("hello"));
//!
//! router.disable(RuleMatch::names(["greet"])).await;
//! assert!(router.list_tools().await.is_empty());
//! assert!(router.call_tool("greet", Default::default()).await.is_err());
//! # });
//! ```

use crate::component::{
    AnyComponent, Arguments, Component, ComponentKind, Prompt, PromptMessage, Resource, ResourceContent,
    ResourceTemplate, Tool, ToolResult,
};
use crate::config::RouterConfig;
use crate::context::CallContext;
use crate::error::{
    PromptError, ProviderError, RegistryError, ResourceError, RouterError, ToolError, TransformError,
    VisibilityError,
};
use crate::notify;
use crate::provider::{MountedProvider, Provider};
use crate::registry::LocalRegistry;
use crate::transform::ToolTransform;
use crate::visibility::{RuleMatch, RuleSet, VisibilityRule, VisibilityStore};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Composes providers into one addressable surface.
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    config: RouterConfig,
    local: LocalRegistry,
    providers: RwLock<Vec<Arc<dyn Provider>>>,
    visibility: VisibilityStore,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<String> = self.providers().iter().map(|p| p.name().to_string()).collect();
        f.debug_struct("Router")
            .field("name", &self.inner.config.name())
            .field("providers", &providers)
            .field("visibility", &self.inner.visibility)
            .finish()
    }
}

impl Router {
    /// Creates a router with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(RouterConfig::new(name))
    }

    /// Creates a router from a configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::config::{DuplicatePolicy, RouterConfig};
    /// use mcp_router::router::Router;
    ///
    /// let router = Router::with_config(
    ///     RouterConfig::builder()
    ///         .name("gateway")
    ///         .on_duplicate(DuplicatePolicy::Replace)
    ///         .build(),
    /// );
    /// assert_eq!(router.local().policy(), DuplicatePolicy::Replace);
    /// ```
    pub fn with_config(config: RouterConfig) -> Self {
        let local = LocalRegistry::with_policy(config.on_duplicate());
        let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(local.clone())];
        Self {
            inner: Arc::new(RouterInner {
                config,
                local,
                providers: RwLock::new(providers),
                visibility: VisibilityStore::new(),
            }),
        }
    }

    /// Returns the router name.
    pub fn name(&self) -> &str {
        self.inner.config.name()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Returns the router's own registry.
    pub fn local(&self) -> &LocalRegistry {
        &self.inner.local
    }

    /// Returns the visibility rule store.
    pub fn visibility(&self) -> &VisibilityStore {
        &self.inner.visibility
    }

    /// Returns a snapshot of the providers in registration order.
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.inner.providers.read().clone()
    }

    // ========================================================================
    // Local registration
    // ========================================================================

    /// Registers a tool in the local registry.
    pub fn add_tool(&self, tool: Tool) -> Result<Tool, RegistryError> {
        self.inner.local.add_tool(tool)
    }

    /// Registers a resource in the local registry.
    pub fn add_resource(&self, resource: Resource) -> Result<Resource, RegistryError> {
        self.inner.local.add_resource(resource)
    }

    /// Registers a resource template in the local registry.
    pub fn add_template(&self, template: ResourceTemplate) -> Result<ResourceTemplate, RegistryError> {
        self.inner.local.add_template(template)
    }

    /// Registers a prompt in the local registry.
    pub fn add_prompt(&self, prompt: Prompt) -> Result<Prompt, RegistryError> {
        self.inner.local.add_prompt(prompt)
    }

    /// Registers a transformation for the local tool called `tool_name`.
    ///
    /// # Errors
    ///
    /// The transform is invalid for a stored tool of that name.
    pub fn add_transform(&self, tool_name: impl Into<String>, transform: ToolTransform) -> Result<(), TransformError> {
        self.inner.local.add_transform(tool_name, transform)
    }

    // ========================================================================
    // Composition
    // ========================================================================

    /// Appends a provider. It ranks after every provider added before it.
    ///
    /// The current session, if any, is told about each kind the provider
    /// contributes enabled components of.
    pub async fn add_provider<P: Provider + 'static>(&self, provider: P) {
        self.add_provider_arc(Arc::new(provider)).await;
    }

    /// Appends a shared provider.
    pub async fn add_provider_arc(&self, provider: Arc<dyn Provider>) {
        debug!(router = self.name(), provider = provider.name(), "Adding provider");
        self.inner.providers.write().push(provider.clone());
        if notify::session_attached() {
            let kinds = self.contributed_kinds(provider.as_ref()).await;
            notify::dispatch(kinds);
        }
    }

    /// Mounts a provider live under `prefix`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::{Component, Tool};
    /// use mcp_router::router::Router;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let child = Router::new("child");
    /// let parent = Router::new("parent");
    /// parent.mount(child.clone(), Some("child")).await;
    ///
    /// // Added after mounting, still visible.
    /// child
    ///     .add_tool(Tool::from_fn("ping", json!({"type": "object"}), |_| async { Ok(json!("pong")) }))
    ///     .unwrap();
    ///
    /// let names: Vec<String> = parent.list_tools().await.iter().map(|t| t.name().to_string()).collect();
    /// assert_eq!(names, vec!["child_ping"]);
    /// # });
    /// ```
    pub async fn mount<P: Provider + 'static>(&self, provider: P, prefix: Option<&str>) {
        self.mount_with(MountedProvider::new(provider, prefix)).await;
    }

    /// Mounts a preconfigured [`MountedProvider`], e.g. one with tool name
    /// overrides.
    pub async fn mount_with(&self, mounted: MountedProvider) {
        self.add_provider(mounted).await;
    }

    /// Copies the components of `provider` into the local registry under
    /// `prefix`. Later conflicts are resolved by the registry, where the
    /// latest import wins.
    ///
    /// # Errors
    ///
    /// The provider's listing error, or an invalid prefixed URI template.
    pub async fn import<P: Provider + ?Sized>(&self, provider: &P, prefix: Option<&str>) -> Result<usize, RouterError> {
        self.inner.local.import_from(provider, prefix).await
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Lists enabled tools from every provider, in registration order.
    pub async fn list_tools(&self) -> Vec<Tool> {
        let rules = self.current_rules();
        self.collect("list_tools", |p| async move { p.list_tools().await })
            .await
            .into_iter()
            .filter(|tool| rules.is_enabled(tool))
            .collect()
    }

    /// Lists enabled resources from every provider, in registration order.
    pub async fn list_resources(&self) -> Vec<Resource> {
        let rules = self.current_rules();
        self.collect("list_resources", |p| async move { p.list_resources().await })
            .await
            .into_iter()
            .filter(|resource| rules.is_enabled(resource))
            .collect()
    }

    /// Lists enabled resource templates from every provider, in registration
    /// order.
    pub async fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        let rules = self.current_rules();
        self.collect("list_resource_templates", |p| async move {
            p.list_resource_templates().await
        })
        .await
        .into_iter()
        .filter(|template| rules.is_enabled(template))
        .collect()
    }

    /// Lists enabled prompts from every provider, in registration order.
    pub async fn list_prompts(&self) -> Vec<Prompt> {
        let rules = self.current_rules();
        self.collect("list_prompts", |p| async move { p.list_prompts().await })
            .await
            .into_iter()
            .filter(|prompt| rules.is_enabled(prompt))
            .collect()
    }

    /// Lists enabled task-eligible components from every provider.
    pub async fn get_tasks(&self) -> Vec<AnyComponent> {
        let rules = self.current_rules();
        self.collect("get_tasks", |p| async move { p.get_tasks().await })
            .await
            .into_iter()
            .filter(|component| rules.is_enabled(component.as_component()))
            .collect()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the first enabled tool called `name`.
    ///
    /// # Errors
    ///
    /// Only when every provider failed.
    pub async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        let rules = self.current_rules();
        let name = name.to_string();
        self.first_enabled("get_tool", &rules, move |p| {
            let name = name.clone();
            async move { p.get_tool(&name).await }
        })
        .await
    }

    /// Returns the first enabled resource at `uri`.
    ///
    /// # Errors
    ///
    /// Only when every provider failed.
    pub async fn get_resource(&self, uri: &str) -> Result<Option<Resource>, ProviderError> {
        let rules = self.current_rules();
        let uri = uri.to_string();
        self.first_enabled("get_resource", &rules, move |p| {
            let uri = uri.clone();
            async move { p.get_resource(&uri).await }
        })
        .await
    }

    /// Returns the first enabled template matching `uri`.
    ///
    /// # Errors
    ///
    /// Only when every provider failed.
    pub async fn get_resource_template(&self, uri: &str) -> Result<Option<ResourceTemplate>, ProviderError> {
        let rules = self.current_rules();
        let uri = uri.to_string();
        self.first_enabled("get_resource_template", &rules, move |p| {
            let uri = uri.clone();
            async move { p.get_resource_template(&uri).await }
        })
        .await
    }

    /// Returns the first enabled prompt called `name`.
    ///
    /// # Errors
    ///
    /// Only when every provider failed.
    pub async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, ProviderError> {
        let rules = self.current_rules();
        let name = name.to_string();
        self.first_enabled("get_prompt", &rules, move |p| {
            let name = name.clone();
            async move { p.get_prompt(&name).await }
        })
        .await
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Calls the first enabled tool called `name`.
    ///
    /// # Errors
    ///
    /// `ToolError::NotFound` when no provider has an enabled tool of that
    /// name, otherwise whatever the tool returns.
    pub async fn call_tool(&self, name: &str, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let tool = self
            .get_tool(name)
            .await?
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let ctx = CallContext::current().unwrap_or_default();
        tool.run(arguments, &ctx).await
    }

    /// Reads the resource at `uri`, trying concrete resources before
    /// templates.
    ///
    /// # Errors
    ///
    /// `ResourceError::NotFound` when nothing enabled matches.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        let ctx = CallContext::current().unwrap_or_default();
        if let Some(resource) = self.get_resource(uri).await? {
            return resource.read(&ctx).await;
        }
        match self.get_resource_template(uri).await? {
            Some(template) => template.read(uri, &ctx).await,
            None => Err(ResourceError::NotFound(uri.to_string())),
        }
    }

    /// Renders the first enabled prompt called `name`.
    ///
    /// # Errors
    ///
    /// `PromptError::NotFound` when no provider has an enabled prompt of
    /// that name, otherwise whatever rendering returns.
    pub async fn render_prompt(&self, name: &str, arguments: Arguments) -> Result<Vec<PromptMessage>, PromptError> {
        let prompt = self
            .get_prompt(name)
            .await?
            .ok_or_else(|| PromptError::NotFound(name.to_string()))?;
        let ctx = CallContext::current().unwrap_or_default();
        prompt.render(arguments, &ctx).await
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Enables matching components for everyone.
    ///
    /// Notifies the current session for every kind whose visible set
    /// changed; enabling something already enabled sends nothing.
    pub async fn enable(&self, matcher: RuleMatch) {
        self.change_rules(|store| store.add_global(VisibilityRule::enable(matcher)))
            .await;
    }

    /// Disables matching components for everyone.
    pub async fn disable(&self, matcher: RuleMatch) {
        self.change_rules(|store| store.add_global(VisibilityRule::disable(matcher)))
            .await;
    }

    /// Enables matching components for the current session only.
    ///
    /// # Errors
    ///
    /// `VisibilityError::NoSession` outside of a session.
    pub async fn enable_for_session(&self, matcher: RuleMatch) -> Result<(), VisibilityError> {
        let session_id = current_session_id().ok_or(VisibilityError::NoSession)?;
        self.change_rules(|store| store.add_session(&session_id, VisibilityRule::enable(matcher)))
            .await;
        Ok(())
    }

    /// Disables matching components for the current session only.
    ///
    /// # Errors
    ///
    /// `VisibilityError::NoSession` outside of a session.
    pub async fn disable_for_session(&self, matcher: RuleMatch) -> Result<(), VisibilityError> {
        let session_id = current_session_id().ok_or(VisibilityError::NoSession)?;
        self.change_rules(|store| store.add_session(&session_id, VisibilityRule::disable(matcher)))
            .await;
        Ok(())
    }

    /// Drops every global rule. Returns how many were removed.
    pub async fn reset_visibility(&self) -> usize {
        let mut removed = 0;
        self.change_rules(|store| removed = store.reset_global()).await;
        removed
    }

    /// Drops the current session's rules. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// `VisibilityError::NoSession` outside of a session.
    pub async fn reset_session_visibility(&self) -> Result<usize, VisibilityError> {
        let session_id = current_session_id().ok_or(VisibilityError::NoSession)?;
        let mut removed = 0;
        self.change_rules(|store| removed = store.reset_session(&session_id))
            .await;
        Ok(removed)
    }

    /// Forgets the rules of a session that has ended.
    pub fn end_session(&self, session_id: &str) {
        let removed = self.inner.visibility.reset_session(session_id);
        debug!(session = session_id, removed, "Session ended, dropped visibility rules");
    }

    /// Returns `true` if `component` is enabled under the caller's view.
    pub fn is_enabled<C: Component + ?Sized>(&self, component: &C) -> bool {
        self.current_rules().is_enabled(component)
    }

    fn current_rules(&self) -> RuleSet {
        let session_id = current_session_id();
        self.inner.visibility.rules_for(session_id.as_deref())
    }

    /// Applies a rule change and notifies the kinds whose effective enabled
    /// set changed under the caller's view.
    async fn change_rules<F>(&self, change: F)
    where
        F: FnOnce(&VisibilityStore),
    {
        let components = self.all_components().await;
        let before = self.current_rules();
        change(&self.inner.visibility);
        let after = self.current_rules();

        let changed: BTreeSet<ComponentKind> = components
            .iter()
            .filter(|c| before.is_enabled(c.as_component()) != after.is_enabled(c.as_component()))
            .map(AnyComponent::kind)
            .collect();
        notify::dispatch(changed);
    }

    async fn all_components(&self) -> Vec<AnyComponent> {
        let (tools, resources, templates, prompts) = futures::join!(
            self.collect("list_tools", |p| async move { p.list_tools().await }),
            self.collect("list_resources", |p| async move { p.list_resources().await }),
            self.collect("list_resource_templates", |p| async move {
                p.list_resource_templates().await
            }),
            self.collect("list_prompts", |p| async move { p.list_prompts().await }),
        );

        let mut all: Vec<AnyComponent> = Vec::new();
        all.extend(tools.into_iter().map(AnyComponent::from));
        all.extend(resources.into_iter().map(AnyComponent::from));
        all.extend(templates.into_iter().map(AnyComponent::from));
        all.extend(prompts.into_iter().map(AnyComponent::from));
        all
    }

    // ========================================================================
    // Fan-out
    // ========================================================================

    /// Runs `operation` on every provider concurrently. Results come back
    /// in registration order; failures and timeouts are logged and `Err`.
    async fn fan_out<T, F, Fut>(&self, operation: &'static str, f: F) -> Vec<Result<T, ProviderError>>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let providers = self.providers();
        let timeout = self.inner.config.provider_timeout();

        let calls = providers.iter().map(|provider| bounded(timeout, f(provider.clone())));
        let results = join_all(calls).await;

        for (provider, result) in providers.iter().zip(&results) {
            if let Err(e) = result {
                debug!(provider = provider.name(), operation, error = %e, "Provider failed, skipping");
            }
        }
        results
    }

    /// Kinds `provider` lists at least one enabled component of. A failed
    /// listing contributes nothing.
    async fn contributed_kinds(&self, provider: &dyn Provider) -> BTreeSet<ComponentKind> {
        let rules = self.current_rules();
        let timeout = self.inner.config.provider_timeout();
        let (tools, resources, templates, prompts) = futures::join!(
            bounded(timeout, provider.list_tools()),
            bounded(timeout, provider.list_resources()),
            bounded(timeout, provider.list_resource_templates()),
            bounded(timeout, provider.list_prompts()),
        );

        let mut kinds = BTreeSet::new();
        if tools.is_ok_and(|tools| tools.iter().any(|t| rules.is_enabled(t))) {
            kinds.insert(ComponentKind::Tool);
        }
        if resources.is_ok_and(|resources| resources.iter().any(|r| rules.is_enabled(r))) {
            kinds.insert(ComponentKind::Resource);
        }
        if templates.is_ok_and(|templates| templates.iter().any(|t| rules.is_enabled(t))) {
            kinds.insert(ComponentKind::Template);
        }
        if prompts.is_ok_and(|prompts| prompts.iter().any(|p| rules.is_enabled(p))) {
            kinds.insert(ComponentKind::Prompt);
        }
        kinds
    }

    /// Concatenates successful listings in registration order.
    async fn collect<T, F, Fut>(&self, operation: &'static str, f: F) -> Vec<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ProviderError>>,
    {
        self.fan_out(operation, f)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .flatten()
            .collect()
    }

    /// Returns the first enabled hit in registration order.
    async fn first_enabled<T, F, Fut>(&self, operation: &'static str, rules: &RuleSet, f: F) -> Result<Option<T>, ProviderError>
    where
        T: Component,
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<Option<T>, ProviderError>>,
    {
        let results = self.fan_out(operation, f).await;
        let attempted = results.len();
        let mut failed = 0;
        for result in results {
            match result {
                Ok(Some(component)) if rules.is_enabled(&component) => return Ok(Some(component)),
                Ok(_) => {}
                Err(_) => failed += 1,
            }
        }
        if attempted > 0 && failed == attempted {
            return Err(ProviderError::Unreachable {
                provider: self.name().to_string(),
                reason: format!("all {} providers failed during {}", attempted, operation),
            });
        }
        Ok(None)
    }
}

fn current_session_id() -> Option<String> {
    CallContext::current().and_then(|ctx| ctx.session_id().map(str::to_string))
}

/// Bounds one provider call by `limit`.
async fn bounded<T, Fut>(limit: Option<Duration>, call: Fut) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(limit))),
        None => call.await,
    }
}

#[async_trait]
impl Provider for Router {
    fn name(&self) -> &str {
        self.inner.config.name()
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        Ok(Router::list_tools(self).await)
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        Ok(Router::list_resources(self).await)
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        Ok(Router::list_resource_templates(self).await)
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        Ok(Router::list_prompts(self).await)
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        Router::get_tool(self, name).await
    }

    async fn get_resource(&self, uri: &str) -> Result<Option<Resource>, ProviderError> {
        Router::get_resource(self, uri).await
    }

    async fn get_resource_template(&self, uri: &str) -> Result<Option<ResourceTemplate>, ProviderError> {
        Router::get_resource_template(self, uri).await
    }

    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, ProviderError> {
        Router::get_prompt(self, name).await
    }

    async fn get_tasks(&self) -> Result<Vec<AnyComponent>, ProviderError> {
        Ok(Router::get_tasks(self).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::TaskMode;
    use crate::notify::{MockSession, Notification};
    use crate::provider::testing::{returning, FailingProvider, StaticProvider};
    use serde_json::json;
    use std::time::Duration;

    fn in_session<F: Future>(session: &Arc<MockSession>, future: F) -> impl Future<Output = F::Output> {
        CallContext::scope(CallContext::builder().session(session.clone()).build(), future)
    }

    struct SlowProvider;

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![returning("late", json!(null))])
        }

        async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
            Ok(Vec::new())
        }

        async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
            Ok(Vec::new())
        }

        async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_listing_keeps_duplicates_in_order() {
        let router = Router::new("r");
        router.add_provider(StaticProvider::new("p1").tool(returning("k", json!(1)))).await;
        router.add_provider(StaticProvider::new("p2").tool(returning("k", json!(2)))).await;

        assert_eq!(router.list_tools().await.len(), 2);

        let result = router.call_tool("k", Arguments::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("1"));
    }

    #[tokio::test]
    async fn test_local_registry_ranks_first() {
        let router = Router::new("r");
        router.add_provider(StaticProvider::new("p").tool(returning("k", json!("provider")))).await;
        router.add_tool(returning("k", json!("local"))).unwrap();

        let result = router.call_tool("k", Arguments::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("local"));
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped() {
        let router = Router::new("r");
        router.add_provider(FailingProvider).await;
        router.add_provider(StaticProvider::new("ok").tool(returning("k", json!("ok")))).await;

        assert_eq!(router.list_tools().await.len(), 1);
        assert!(router.get_tool("k").await.unwrap().is_some());
        assert!(router.get_tool("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_keeps_registration_order() {
        let router = Router::new("r");
        router.add_provider(FailingProvider).await;
        router.add_provider(StaticProvider::new("p").prompt(Prompt::from_fn("hi", |_| async { Ok(Vec::new()) }))).await;

        let results = router.fan_out("probe", |p| async move { p.list_prompts().await }).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().is_empty());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let router = Router::with_config(
            RouterConfig::builder()
                .provider_timeout(Duration::from_millis(50))
                .build(),
        );
        router.add_provider(SlowProvider).await;
        router.add_tool(returning("fast", json!(null))).unwrap();

        let tools = router.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "fast");
    }

    #[tokio::test]
    async fn test_read_resource_prefers_concrete() {
        let router = Router::new("r");
        router.add_resource(Resource::text("data://fixed", "concrete")).unwrap();
        router
            .add_template(
                ResourceTemplate::from_fn("data://{id}", |params| async move {
                    Ok(ResourceContent::text(format!("templated {}", params["id"]), "text/plain"))
                })
                .unwrap(),
            )
            .unwrap();

        let fixed = router.read_resource("data://fixed").await.unwrap();
        assert_eq!(fixed.as_text(), Some("concrete"));
        let other = router.read_resource("data://other").await.unwrap();
        assert_eq!(other.as_text(), Some("templated other"));
        assert!(matches!(
            router.read_resource("none://x").await,
            Err(ResourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_render_prompt_not_found() {
        let router = Router::new("r");
        assert!(matches!(
            router.render_prompt("missing", Arguments::new()).await,
            Err(PromptError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_first_falls_through_to_next_provider() {
        let router = Router::new("r");
        router.add_tool(returning("k", json!("local")).with_tag("beta")).unwrap();
        router.add_provider(StaticProvider::new("p").tool(returning("k", json!("provider")))).await;

        router.disable(RuleMatch::tags(["beta"])).await;
        let result = router.call_tool("k", Arguments::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("provider"));
    }

    #[tokio::test]
    async fn test_enable_disable_notifications() {
        let router = Router::new("r");
        router.add_tool(returning("greet", json!(null))).unwrap();
        let session = MockSession::new("s");

        in_session(&session, router.enable(RuleMatch::names(["greet"]))).await;
        assert!(session.notifications().is_empty());

        in_session(&session, router.disable(RuleMatch::names(["greet"]))).await;
        assert_eq!(session.notifications(), vec![Notification::ToolListChanged]);

        in_session(&session, router.disable(RuleMatch::names(["greet"]))).await;
        assert_eq!(session.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_add_provider_notifies_contributed_kinds() {
        let router = Router::new("r");
        let session = MockSession::new("s");

        let prompts = StaticProvider::new("p").prompt(Prompt::from_fn("hi", |_| async { Ok(Vec::new()) }));
        in_session(&session, router.add_provider(prompts)).await;
        assert_eq!(session.notifications(), vec![Notification::PromptListChanged]);

        session.clear();
        in_session(&session, router.add_provider(StaticProvider::new("empty"))).await;
        in_session(&session, router.add_provider(FailingProvider)).await;
        assert!(session.notifications().is_empty());

        in_session(&session, router.disable(RuleMatch::names(["k"]))).await;
        session.clear();
        let hidden = StaticProvider::new("hidden").tool(returning("k", json!(1)));
        in_session(&session, router.add_provider(hidden)).await;
        assert!(session.notifications().is_empty());
        assert_eq!(router.providers().len(), 5);
    }

    #[tokio::test]
    async fn test_session_rules_are_isolated() {
        let router = Router::new("r");
        router.add_tool(returning("greet", json!(null))).unwrap();
        let a = MockSession::new("a");
        let b = MockSession::new("b");

        in_session(&a, async {
            router.disable_for_session(RuleMatch::names(["greet"])).await.unwrap();
        })
        .await;

        assert!(in_session(&a, router.list_tools()).await.is_empty());
        assert_eq!(in_session(&b, router.list_tools()).await.len(), 1);
        assert_eq!(router.list_tools().await.len(), 1);
        assert_eq!(a.count(Notification::ToolListChanged), 1);
        assert!(b.notifications().is_empty());

        router.end_session("a");
        assert_eq!(in_session(&a, router.list_tools()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_session_rule_overrides_global() {
        let router = Router::new("r");
        router.add_tool(returning("greet", json!(null))).unwrap();
        router.disable(RuleMatch::names(["greet"])).await;

        let session = MockSession::new("s");
        in_session(&session, async {
            router.enable_for_session(RuleMatch::names(["greet"])).await.unwrap();
            assert_eq!(router.list_tools().await.len(), 1);
        })
        .await;
        assert!(router.list_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_rules_need_a_session() {
        let router = Router::new("r");
        assert_eq!(
            router.disable_for_session(RuleMatch::all()).await,
            Err(VisibilityError::NoSession)
        );
        assert_eq!(router.reset_session_visibility().await, Err(VisibilityError::NoSession));
    }

    #[tokio::test]
    async fn test_reset_visibility_notifies_changed_kinds() {
        let router = Router::new("r");
        router.add_tool(returning("t", json!(null))).unwrap();
        router
            .add_prompt(Prompt::from_fn("p", |_| async { Ok(Vec::new()) }))
            .unwrap();
        router.disable(RuleMatch::names(["t"])).await;

        let session = MockSession::new("s");
        let removed = in_session(&session, router.reset_visibility()).await;
        assert_eq!(removed, 1);
        assert_eq!(session.notifications(), vec![Notification::ToolListChanged]);
    }

    #[tokio::test]
    async fn test_get_tasks_filters_disabled() {
        let router = Router::new("r");
        router
            .add_tool(returning("job", json!(null)).with_task_mode(TaskMode::Optional))
            .unwrap();
        router
            .add_tool(returning("hidden_job", json!(null)).with_task_mode(TaskMode::Required))
            .unwrap();
        router.add_tool(returning("inline", json!(null))).unwrap();
        router.disable(RuleMatch::names(["hidden_job"])).await;

        let tasks = router.get_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name(), "job");
    }

    #[tokio::test]
    async fn test_nested_router_visibility() {
        let child = Router::new("child");
        child.add_tool(returning("a", json!(null))).unwrap();
        child.add_tool(returning("b", json!(null))).unwrap();
        child.disable(RuleMatch::names(["a"])).await;

        let parent = Router::new("parent");
        parent.mount(child, Some("c")).await;
        let names: Vec<String> = parent.list_tools().await.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["c_b"]);

        parent.disable(RuleMatch::names(["c_b"])).await;
        assert!(parent.list_tools().await.is_empty());
    }
}
