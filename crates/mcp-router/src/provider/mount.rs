//! Live, prefixed mounting of one provider into another namespace.
//!
//! Tools and prompts are renamed `prefix_name`. Resources and templates keep
//! their scheme and gain the prefix as the first path segment:
//! `data://config` mounted under `sub` becomes `data://sub/config`.
//!
//! Rewriting happens on every call, so changes in the mounted provider are
//! visible immediately. A name or URI that does not carry the prefix is
//! never forwarded to the mounted provider.

use super::Provider;
use crate::component::{AnyComponent, Component, Prompt, Resource, ResourceTemplate, Tool, UriTemplate};
use crate::error::{ProviderError, ResourceError, TransformError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Prefixes a tool or prompt name.
///
/// ```
/// use mcp_router::provider::mount::prefix_name;
///
/// assert_eq!(prefix_name("weather", "forecast"), "weather_forecast");
/// ```
pub fn prefix_name(prefix: &str, name: &str) -> String {
    format!("{}_{}", prefix, name)
}

/// Strips the prefix from a tool or prompt name.
pub fn strip_name_prefix<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_prefix('_')
}

/// Inserts the prefix as the first path segment of a URI or URI template.
///
/// ```
/// use mcp_router::provider::mount::prefix_uri;
///
/// assert_eq!(prefix_uri("sub", "data://config"), "data://sub/config");
/// assert_eq!(prefix_uri("sub", "users://{id}/profile"), "users://sub/{id}/profile");
/// assert_eq!(prefix_uri("sub", "notes/today"), "sub/notes/today");
/// ```
pub fn prefix_uri(prefix: &str, uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, rest)) => format!("{}://{}/{}", scheme, prefix, rest),
        None => format!("{}/{}", prefix, uri),
    }
}

/// Removes the prefix inserted by [`prefix_uri`].
///
/// ```
/// use mcp_router::provider::mount::strip_uri_prefix;
///
/// assert_eq!(strip_uri_prefix("sub", "data://sub/config").as_deref(), Some("data://config"));
/// assert_eq!(strip_uri_prefix("sub", "data://config"), None);
/// ```
pub fn strip_uri_prefix(prefix: &str, uri: &str) -> Option<String> {
    match uri.split_once("://") {
        Some((scheme, rest)) => {
            let rest = rest.strip_prefix(prefix)?.strip_prefix('/')?;
            Some(format!("{}://{}", scheme, rest))
        }
        None => uri.strip_prefix(prefix)?.strip_prefix('/').map(str::to_string),
    }
}

/// Returns a copy of `tool` renamed under `prefix`.
pub fn prefix_tool(prefix: &str, tool: Tool) -> Tool {
    let name = prefix_name(prefix, tool.name());
    tool.with_name(name)
}

/// Returns a copy of `prompt` renamed under `prefix`.
pub fn prefix_prompt(prefix: &str, prompt: Prompt) -> Prompt {
    let name = prefix_name(prefix, prompt.name());
    prompt.with_name(name)
}

/// Returns a copy of `resource` with its URI prefixed.
pub fn prefix_resource(prefix: &str, resource: Resource) -> Resource {
    let uri = prefix_uri(prefix, resource.uri());
    resource.with_uri(uri)
}

/// Returns a copy of `template` with its URI template prefixed.
///
/// # Errors
///
/// `ResourceError::InvalidUri` if the prefixed template does not parse, which
/// happens when the prefix itself contains template syntax.
pub fn prefix_template(prefix: &str, template: ResourceTemplate) -> Result<ResourceTemplate, ResourceError> {
    let uri_template = UriTemplate::parse(prefix_uri(prefix, template.uri_template()))?;
    Ok(template.with_template(uri_template))
}

/// A provider exposed under a prefix.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{Component, Tool};
/// use mcp_router::provider::{MountedProvider, Provider};
/// use mcp_router::registry::LocalRegistry;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let weather = LocalRegistry::new();
/// weather
///     .add_tool(Tool::from_fn("forecast", json!({"type": "object"}), |_| async {
///         Ok(json!("sunny"))
///     }))
///     .unwrap();
///
/// let mounted = MountedProvider::new(weather, Some("weather"));
/// let tools = mounted.list_tools().await.unwrap();
/// assert_eq!(tools[0].name(), "weather_forecast");
///
/// assert!(mounted.get_tool("weather_forecast").await.unwrap().is_some());
/// assert!(mounted.get_tool("forecast").await.unwrap().is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct MountedProvider {
    provider: Arc<dyn Provider>,
    prefix: Option<String>,
    label: String,
    // original name -> exposed name
    tool_names: BTreeMap<String, String>,
}

impl fmt::Debug for MountedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedProvider")
            .field("provider", &self.provider.name())
            .field("prefix", &self.prefix)
            .field("tool_names", &self.tool_names)
            .finish()
    }
}

impl MountedProvider {
    /// Mounts `provider` under `prefix`. `None` mounts without renaming.
    pub fn new<P: Provider + 'static>(provider: P, prefix: Option<&str>) -> Self {
        Self::from_arc(Arc::new(provider), prefix)
    }

    /// Mounts an already shared provider.
    pub fn from_arc(provider: Arc<dyn Provider>, prefix: Option<&str>) -> Self {
        let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        let label = match &prefix {
            Some(prefix) => format!("{}@{}", provider.name(), prefix),
            None => provider.name().to_string(),
        };
        Self {
            provider,
            prefix,
            label,
            tool_names: BTreeMap::new(),
        }
    }

    /// Exposes specific tools under explicit names, bypassing the prefix.
    ///
    /// Keys are the mounted provider's tool names, values the exposed names.
    ///
    /// # Errors
    ///
    /// `TransformError::DuplicateNameOverride` if two tools would be exposed
    /// under the same name.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::provider::MountedProvider;
    /// use mcp_router::registry::LocalRegistry;
    ///
    /// let result = MountedProvider::new(LocalRegistry::new(), Some("sub"))
    ///     .with_tool_names([("a", "same"), ("b", "same")]);
    /// assert!(result.is_err());
    /// ```
    pub fn with_tool_names<I, K, V>(mut self, names: I) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let mut tool_names = BTreeMap::new();
        for (original, exposed) in names {
            let exposed = exposed.into();
            if !seen.insert(exposed.clone()) {
                return Err(TransformError::DuplicateNameOverride(exposed));
            }
            tool_names.insert(original.into(), exposed);
        }
        self.tool_names = tool_names;
        Ok(self)
    }

    /// Returns the prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the mounted provider.
    pub fn inner(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn expose_tool(&self, tool: Tool) -> Tool {
        if let Some(exposed) = self.tool_names.get(tool.name()) {
            let exposed = exposed.clone();
            return tool.with_name(exposed);
        }
        match &self.prefix {
            Some(prefix) => prefix_tool(prefix, tool),
            None => tool,
        }
    }

    /// Maps an exposed tool name back to the mounted provider's name.
    fn original_tool_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some((original, _)) = self.tool_names.iter().find(|(_, exposed)| exposed.as_str() == name) {
            return Some(original.as_str());
        }
        let original = match &self.prefix {
            Some(prefix) => strip_name_prefix(prefix, name)?,
            None => name,
        };
        // An overridden tool is only reachable under its override.
        if self.tool_names.contains_key(original) {
            return None;
        }
        Some(original)
    }

    fn expose_prompt(&self, prompt: Prompt) -> Prompt {
        match &self.prefix {
            Some(prefix) => prefix_prompt(prefix, prompt),
            None => prompt,
        }
    }

    fn expose_resource(&self, resource: Resource) -> Resource {
        match &self.prefix {
            Some(prefix) => prefix_resource(prefix, resource),
            None => resource,
        }
    }

    fn expose_template(&self, template: ResourceTemplate) -> Result<ResourceTemplate, ProviderError> {
        match &self.prefix {
            Some(prefix) => prefix_template(prefix, template).map_err(|e| ProviderError::Upstream(e.into())),
            None => Ok(template),
        }
    }

    fn original_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => strip_name_prefix(prefix, name),
            None => Some(name),
        }
    }

    fn original_uri(&self, uri: &str) -> Option<String> {
        match &self.prefix {
            Some(prefix) => strip_uri_prefix(prefix, uri),
            None => Some(uri.to_string()),
        }
    }

    fn expose(&self, component: AnyComponent) -> Result<AnyComponent, ProviderError> {
        Ok(match component {
            AnyComponent::Tool(tool) => self.expose_tool(tool).into(),
            AnyComponent::Resource(resource) => self.expose_resource(resource).into(),
            AnyComponent::Template(template) => self.expose_template(template)?.into(),
            AnyComponent::Prompt(prompt) => self.expose_prompt(prompt).into(),
        })
    }
}

#[async_trait]
impl Provider for MountedProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        let tools = self.provider.list_tools().await?;
        Ok(tools.into_iter().map(|tool| self.expose_tool(tool)).collect())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        let resources = self.provider.list_resources().await?;
        Ok(resources.into_iter().map(|resource| self.expose_resource(resource)).collect())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        let templates = self.provider.list_resource_templates().await?;
        templates
            .into_iter()
            .map(|template| self.expose_template(template))
            .collect()
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        let prompts = self.provider.list_prompts().await?;
        Ok(prompts.into_iter().map(|prompt| self.expose_prompt(prompt)).collect())
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        let Some(original) = self.original_tool_name(name) else {
            return Ok(None);
        };
        let tool = self.provider.get_tool(original).await?;
        Ok(tool.map(|tool| self.expose_tool(tool)))
    }

    async fn get_resource(&self, uri: &str) -> Result<Option<Resource>, ProviderError> {
        let Some(original) = self.original_uri(uri) else {
            return Ok(None);
        };
        let resource = self.provider.get_resource(&original).await?;
        Ok(resource.map(|resource| self.expose_resource(resource)))
    }

    async fn get_resource_template(&self, uri: &str) -> Result<Option<ResourceTemplate>, ProviderError> {
        let Some(original) = self.original_uri(uri) else {
            return Ok(None);
        };
        match self.provider.get_resource_template(&original).await? {
            Some(template) => Ok(Some(self.expose_template(template)?)),
            None => Ok(None),
        }
    }

    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, ProviderError> {
        let Some(original) = self.original_name(name) else {
            return Ok(None);
        };
        let prompt = self.provider.get_prompt(original).await?;
        Ok(prompt.map(|prompt| self.expose_prompt(prompt)))
    }

    async fn get_tasks(&self) -> Result<Vec<AnyComponent>, ProviderError> {
        let tasks = self.provider.get_tasks().await?;
        tasks.into_iter().map(|task| self.expose(task)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ResourceContent, TaskMode};
    use crate::context::CallContext;
    use crate::provider::testing::{returning, StaticProvider};
    use serde_json::json;

    fn fixture() -> StaticProvider {
        StaticProvider::new("child")
            .tool(returning("search", json!("found")))
            .tool(returning("delete", json!("gone")).with_task_mode(TaskMode::Optional))
            .resource(Resource::text("data://config", "cfg"))
            .template(
                ResourceTemplate::from_fn("users://{id}/profile", |params| async move {
                    Ok(ResourceContent::text(format!("user {}", params["id"]), "text/plain"))
                })
                .unwrap(),
            )
            .prompt(Prompt::from_fn("summarize", |_args| async { Ok(Vec::new()) }))
    }

    #[test]
    fn test_strip_name_prefix_requires_separator() {
        assert_eq!(strip_name_prefix("sub", "sub_tool"), Some("tool"));
        assert_eq!(strip_name_prefix("sub", "subtool"), None);
        assert_eq!(strip_name_prefix("sub", "other_tool"), None);
    }

    #[test]
    fn test_uri_prefix_round_trip() {
        let prefixed = prefix_uri("api", "resource://deep/path/file.txt");
        assert_eq!(prefixed, "resource://api/deep/path/file.txt");
        assert_eq!(
            strip_uri_prefix("api", &prefixed).as_deref(),
            Some("resource://deep/path/file.txt")
        );
        assert_eq!(strip_uri_prefix("api", "other://api2/x"), None);
    }

    #[tokio::test]
    async fn test_listings_are_prefixed() {
        let mounted = MountedProvider::new(fixture(), Some("sub"));

        let tools: Vec<String> = mounted
            .list_tools()
            .await
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(tools, vec!["sub_search", "sub_delete"]);

        let resources = mounted.list_resources().await.unwrap();
        assert_eq!(resources[0].uri(), "data://sub/config");

        let templates = mounted.list_resource_templates().await.unwrap();
        assert_eq!(templates[0].uri_template(), "users://sub/{id}/profile");

        let prompts = mounted.list_prompts().await.unwrap();
        assert_eq!(prompts[0].name(), "sub_summarize");
    }

    #[tokio::test]
    async fn test_unprefixed_names_are_not_routed() {
        let mounted = MountedProvider::new(fixture(), Some("sub"));
        assert!(mounted.get_tool("search").await.unwrap().is_none());
        assert!(mounted.get_resource("data://config").await.unwrap().is_none());
        assert!(mounted.get_prompt("summarize").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefixed_template_reads() {
        let mounted = MountedProvider::new(fixture(), Some("sub"));
        let template = mounted
            .get_resource_template("users://sub/7/profile")
            .await
            .unwrap()
            .unwrap();
        let content = template.read("users://sub/7/profile", &CallContext::new()).await.unwrap();
        assert_eq!(content.as_text(), Some("user 7"));
    }

    #[tokio::test]
    async fn test_prefixed_tool_calls_original_handler() {
        let mounted = MountedProvider::new(fixture(), Some("sub"));
        let tool = mounted.get_tool("sub_search").await.unwrap().unwrap();
        let result = tool.run(Default::default(), &CallContext::new()).await.unwrap();
        assert_eq!(result.first_text(), Some("found"));
    }

    #[tokio::test]
    async fn test_tool_name_override() {
        let mounted = MountedProvider::new(fixture(), Some("sub"))
            .with_tool_names([("search", "find_things")])
            .unwrap();

        let names: Vec<String> = mounted
            .list_tools()
            .await
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["find_things", "sub_delete"]);

        assert!(mounted.get_tool("find_things").await.unwrap().is_some());
        assert!(mounted.get_tool("sub_search").await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_override_rejected() {
        let error = MountedProvider::new(fixture(), Some("sub"))
            .with_tool_names([("search", "x"), ("delete", "x")])
            .unwrap_err();
        assert_eq!(error, TransformError::DuplicateNameOverride("x".to_string()));
    }

    #[tokio::test]
    async fn test_tasks_are_prefixed() {
        let mounted = MountedProvider::new(fixture(), Some("sub"));
        let tasks = mounted.get_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name(), "sub_delete");
    }

    #[tokio::test]
    async fn test_no_prefix_passes_through() {
        let mounted = MountedProvider::new(fixture(), None);
        assert!(mounted.prefix().is_none());
        assert!(mounted.get_tool("search").await.unwrap().is_some());
        assert!(mounted.get_resource("data://config").await.unwrap().is_some());
    }
}
