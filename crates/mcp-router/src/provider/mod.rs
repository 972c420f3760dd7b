//! Component providers.
//!
//! A [`Provider`] is anything that can list and look up components of all
//! four kinds: the in-process [`LocalRegistry`](crate::registry::LocalRegistry),
//! a [`ProxyProvider`] forwarding to another server, a [`MountedProvider`]
//! exposing another provider under a prefix, a
//! [`Router`](crate::router::Router), or the filesystem-backed skills
//! provider.
//!
//! Only the four `list_*` operations are required. Every lookup has a
//! default implementation in terms of the listings, which providers backed
//! by an index override for speed.
//!
//! # Examples
//!
//! ```
//! use mcp_router::component::{Prompt, Resource, ResourceTemplate, Tool};
//! use mcp_router::error::ProviderError;
//! use mcp_router::provider::Provider;
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl Provider for Fixed {
//!     fn name(&self) -> &str {
//!         "fixed"
//!     }
//!
//!     async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
//!         Ok(vec![Tool::from_fn("ping", json!({"type": "object"}), |_| async {
//!             Ok(json!("pong"))
//!         })])
//!     }
//!
//!     async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let provider = Fixed;
//! assert!(provider.get_tool("ping").await.unwrap().is_some());
//! assert!(provider.get_tool("missing").await.unwrap().is_none());
//! # });
//! ```

pub mod mount;
pub mod proxy;
#[cfg(feature = "skills")]
pub mod skills;

pub use mount::MountedProvider;
pub use proxy::{
    ConnectionGuard, Connector, InProcessUpstream, ProxyProvider, SharedConnection, Upstream,
};
#[cfg(feature = "skills")]
pub use skills::{Skill, SkillsProvider};

use crate::component::{highest_version, AnyComponent, Component, Prompt, Resource, ResourceTemplate, TaskMode, Tool};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::Arc;

/// A source of components.
///
/// Implementations must be cheap to query concurrently: the router fans
/// listing and lookup calls out to every provider at once.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Lists tools.
    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError>;

    /// Lists concrete resources.
    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError>;

    /// Lists resource templates.
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError>;

    /// Lists prompts.
    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError>;

    /// Looks up a tool by name, preferring the highest version.
    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        let tools = self.list_tools().await?;
        Ok(highest_version(tools.into_iter().filter(|tool| tool.name() == name)))
    }

    /// Looks up a resource by exact URI, preferring the highest version.
    async fn get_resource(&self, uri: &str) -> Result<Option<Resource>, ProviderError> {
        let resources = self.list_resources().await?;
        Ok(highest_version(resources.into_iter().filter(|resource| resource.uri() == uri)))
    }

    /// Returns the first template whose pattern matches `uri`.
    async fn get_resource_template(&self, uri: &str) -> Result<Option<ResourceTemplate>, ProviderError> {
        let templates = self.list_resource_templates().await?;
        Ok(templates.into_iter().find(|template| template.matches(uri).is_some()))
    }

    /// Looks up a prompt by name, preferring the highest version.
    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, ProviderError> {
        let prompts = self.list_prompts().await?;
        Ok(highest_version(prompts.into_iter().filter(|prompt| prompt.name() == name)))
    }

    /// Lists every component that may run as a background task.
    async fn get_tasks(&self) -> Result<Vec<AnyComponent>, ProviderError> {
        let mut tasks: Vec<AnyComponent> = Vec::new();
        tasks.extend(task_eligible(self.list_tools().await?));
        tasks.extend(task_eligible(self.list_resources().await?));
        tasks.extend(task_eligible(self.list_resource_templates().await?));
        tasks.extend(task_eligible(self.list_prompts().await?));
        Ok(tasks)
    }
}

fn task_eligible<T>(components: Vec<T>) -> impl Iterator<Item = AnyComponent>
where
    T: Component + Into<AnyComponent>,
{
    components
        .into_iter()
        .filter(|component| component.task_mode() != TaskMode::Forbidden)
        .map(Into::into)
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        (**self).list_tools().await
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        (**self).list_resources().await
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        (**self).list_resource_templates().await
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        (**self).list_prompts().await
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        (**self).get_tool(name).await
    }

    async fn get_resource(&self, uri: &str) -> Result<Option<Resource>, ProviderError> {
        (**self).get_resource(uri).await
    }

    async fn get_resource_template(&self, uri: &str) -> Result<Option<ResourceTemplate>, ProviderError> {
        (**self).get_resource_template(uri).await
    }

    async fn get_prompt(&self, name: &str) -> Result<Option<Prompt>, ProviderError> {
        (**self).get_prompt(name).await
    }

    async fn get_tasks(&self) -> Result<Vec<AnyComponent>, ProviderError> {
        (**self).get_tasks().await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::component::{Component, ResourceContent, TaskMode};
    use serde_json::json;

    #[tokio::test]
    async fn test_default_get_tool_prefers_highest_version() {
        let provider = StaticProvider::new("p")
            .tool(returning("greet", json!(1)).with_version("1.0"))
            .tool(returning("greet", json!(2)).with_version("2.0"))
            .tool(returning("other", json!(3)));

        let tool = provider.get_tool("greet").await.unwrap().unwrap();
        assert_eq!(tool.version(), Some("2.0"));
        assert!(provider.get_tool("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_get_resource_template_first_match() {
        let first = ResourceTemplate::from_fn("data://{id}", |_params| async {
            Ok(ResourceContent::text("first", "text/plain"))
        })
            .unwrap()
            .with_name("first");
        let second = ResourceTemplate::from_fn("data://{name}", |_params| async {
            Ok(ResourceContent::text("second", "text/plain"))
        })
            .unwrap()
            .with_name("second");
        let provider = StaticProvider::new("p").template(first).template(second);

        let found = provider.get_resource_template("data://42").await.unwrap().unwrap();
        assert_eq!(found.name(), "first");
        assert!(provider.get_resource_template("other://42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_get_tasks_skips_forbidden() {
        let provider = StaticProvider::new("p")
            .tool(returning("background", json!(null)).with_task_mode(TaskMode::Optional))
            .tool(returning("inline", json!(null)))
            .prompt(Prompt::from_fn("report", |_args| async { Ok(Vec::new()) }).with_task_mode(TaskMode::Required));

        let tasks = provider.get_tasks().await.unwrap();
        let names: Vec<&str> = tasks.iter().map(AnyComponent::name).collect();
        assert_eq!(names, vec!["background", "report"]);
    }

    #[tokio::test]
    async fn test_failing_provider_propagates() {
        let provider = FailingProvider;
        assert!(provider.get_tool("x").await.is_err());
        assert!(provider.get_tasks().await.is_err());
    }

    #[tokio::test]
    async fn test_arc_provider_delegates() {
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::new("shared").tool(returning("a", json!(1))));
        assert_eq!(provider.name(), "shared");
        assert_eq!(provider.list_tools().await.unwrap().len(), 1);
    }
}
