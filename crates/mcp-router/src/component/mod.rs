//! Component model.
//!
//! Four kinds of component are exposed to protocol peers: [`Tool`]s,
//! [`Resource`]s, [`ResourceTemplate`]s and [`Prompt`]s. They share the
//! metadata in [`ComponentMeta`] and are identified by a [`Key`].
//!
//! The kinds are kept as distinct types rather than one polymorphic object so
//! kind-specific operations (URI matching, argument schemas) stay statically
//! checked. [`AnyComponent`] is the closed union used where one collection
//! must hold several kinds, such as task listings.
//!
//! # Examples
//!
//! ```
//! use mcp_router::component::{Component, ComponentKind, Tool};
//! use serde_json::json;
//!
//! let tool = Tool::from_fn("greet", json!({"type": "object"}), |_args| async move {
//!     Ok(json!("hello"))
//! })
//! .with_tag("public")
//! .with_version("1.0");
//!
//! assert_eq!(tool.kind(), ComponentKind::Tool);
//! assert_eq!(tool.key().to_string(), "tool:greet@1.0");
//! ```

mod key;
mod prompt;
mod resource;
mod result;
mod template;
mod tool;
mod version;

pub use key::{ComponentKind, Key};
pub use prompt::{Prompt, PromptArgument, PromptDefinition, PromptMessage, PromptRenderer, Role};
pub use resource::{Resource, ResourceContent, ResourceDefinition, ResourceReader};
pub use result::{Content, ToolOutput, ToolResult};
pub use template::{ResourceTemplate, TemplateDefinition, TemplateParams, TemplateReader, UriTemplate};
pub use tool::{Arguments, Tool, ToolAnnotations, ToolDefinition, ToolHandler};
pub(crate) use tool::apply_schema_defaults;
pub use version::{compare_optional_versions, compare_versions, VersionSpec};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Whether a component may run as a background task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Never runs as a task
    #[default]
    Forbidden,
    /// May run as a task when the caller asks
    Optional,
    /// Always runs as a task
    Required,
}

/// Icon advertised for a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    /// Icon location
    pub src: String,

    /// MIME type of the icon
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,

    /// Size hints, e.g. `"48x48"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
}

/// Metadata shared by every component kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMeta {
    /// Component name
    pub name: String,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Description shown to clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unordered tags used for grouping and visibility matching
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,

    /// Icons
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,

    /// Optional version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Task-execution capability
    #[serde(default, rename = "taskMode")]
    pub task_mode: TaskMode,
}

impl ComponentMeta {
    /// Creates metadata with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Behaviour shared by every component kind.
///
/// The builder-style `with_*` methods are provided here so each kind gets
/// them for free.
pub trait Component {
    /// Returns the shared metadata.
    fn meta(&self) -> &ComponentMeta;

    /// Returns the shared metadata mutably.
    fn meta_mut(&mut self) -> &mut ComponentMeta;

    /// Returns the component kind.
    fn kind(&self) -> ComponentKind;

    /// Returns the identifier used in keys: the name for tools and prompts,
    /// the URI for resources, the URI template for templates.
    fn identifier(&self) -> &str;

    /// Returns the storage key.
    fn key(&self) -> Key {
        Key::new(self.kind(), self.identifier(), self.meta().version.clone())
    }

    /// Returns the component name.
    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Returns the tag set.
    fn tags(&self) -> &BTreeSet<String> {
        &self.meta().tags
    }

    /// Returns the version, if any.
    fn version(&self) -> Option<&str> {
        self.meta().version.as_deref()
    }

    /// Returns the task-execution capability.
    fn task_mode(&self) -> TaskMode {
        self.meta().task_mode
    }

    /// Sets the title.
    fn with_title(mut self, title: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().title = Some(title.into());
        self
    }

    /// Sets the description.
    fn with_description(mut self, description: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().description = Some(description.into());
        self
    }

    /// Adds one tag.
    fn with_tag(mut self, tag: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().tags.insert(tag.into());
        self
    }

    /// Adds several tags.
    fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta_mut().tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the version.
    fn with_version(mut self, version: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().version = Some(version.into());
        self
    }

    /// Sets the task mode.
    fn with_task_mode(mut self, mode: TaskMode) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().task_mode = mode;
        self
    }

    /// Adds a metadata entry.
    fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().meta.insert(key.into(), value);
        self
    }

    /// Adds an icon.
    fn with_icon(mut self, icon: Icon) -> Self
    where
        Self: Sized,
    {
        self.meta_mut().icons.push(icon);
        self
    }
}

/// A component of any kind.
#[derive(Debug, Clone)]
pub enum AnyComponent {
    /// Tool
    Tool(Tool),
    /// Resource
    Resource(Resource),
    /// Resource template
    Template(ResourceTemplate),
    /// Prompt
    Prompt(Prompt),
}

impl AnyComponent {
    /// Borrows the inner component through the shared trait.
    pub fn as_component(&self) -> &dyn Component {
        match self {
            AnyComponent::Tool(c) => c,
            AnyComponent::Resource(c) => c,
            AnyComponent::Template(c) => c,
            AnyComponent::Prompt(c) => c,
        }
    }

    /// Returns the component kind.
    pub fn kind(&self) -> ComponentKind {
        self.as_component().kind()
    }

    /// Returns the storage key.
    pub fn key(&self) -> Key {
        self.as_component().key()
    }

    /// Returns the component name.
    pub fn name(&self) -> &str {
        match self {
            AnyComponent::Tool(c) => c.name(),
            AnyComponent::Resource(c) => c.name(),
            AnyComponent::Template(c) => c.name(),
            AnyComponent::Prompt(c) => c.name(),
        }
    }

    /// Returns the tool, if this is one.
    pub fn as_tool(&self) -> Option<&Tool> {
        match self {
            AnyComponent::Tool(tool) => Some(tool),
            _ => None,
        }
    }
}

impl From<Tool> for AnyComponent {
    fn from(tool: Tool) -> Self {
        AnyComponent::Tool(tool)
    }
}

impl From<Resource> for AnyComponent {
    fn from(resource: Resource) -> Self {
        AnyComponent::Resource(resource)
    }
}

impl From<ResourceTemplate> for AnyComponent {
    fn from(template: ResourceTemplate) -> Self {
        AnyComponent::Template(template)
    }
}

impl From<Prompt> for AnyComponent {
    fn from(prompt: Prompt) -> Self {
        AnyComponent::Prompt(prompt)
    }
}

/// Picks the highest version among components sharing a name.
///
/// Unversioned components sort below every versioned one. Among equal
/// versions the first one wins.
pub fn highest_version<T: Component>(candidates: impl IntoIterator<Item = T>) -> Option<T> {
    let mut best: Option<T> = None;
    for candidate in candidates {
        let replace = match &best {
            None => true,
            Some(current) => {
                compare_optional_versions(candidate.version(), current.version())
                    == std::cmp::Ordering::Greater
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    best
}
