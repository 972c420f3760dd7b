//! Prompts: parameterized message templates.

use super::{Arguments, Component, ComponentKind, ComponentMeta, Content};
use crate::context::CallContext;
use crate::error::PromptError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
}

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl PromptMessage {
    /// Creates a user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// Creates an assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether callers must supply it
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    /// Declares a required argument.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: true,
        }
    }

    /// Declares an optional argument.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Wire description of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Prompt name
    pub name: String,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,

    /// Tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Arbitrary metadata
    #[serde(default, rename = "_meta", skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

/// Produces the messages of a prompt.
#[async_trait]
pub trait PromptRenderer: Send + Sync {
    /// Renders with already validated arguments.
    async fn render(&self, arguments: Arguments, ctx: &CallContext) -> Result<Vec<PromptMessage>, PromptError>;
}

/// A named message template.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{Prompt, PromptArgument, PromptMessage};
/// use mcp_router::context::CallContext;
/// use serde_json::{json, Map};
///
/// # tokio_test::block_on(async {
/// let prompt = Prompt::from_fn("review", |args| async move {
///     let lang = args["language"].as_str().unwrap_or("code").to_string();
///     Ok(vec![PromptMessage::user(format!("Review this {}", lang))])
/// })
/// .with_argument(PromptArgument::required("language"));
///
/// let mut args = Map::new();
/// args.insert("language".into(), json!("rust"));
/// let messages = prompt.render(args, &CallContext::new()).await.unwrap();
/// assert_eq!(messages[0].content.as_text(), Some("Review this rust"));
///
/// assert!(prompt.render(Map::new(), &CallContext::new()).await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct Prompt {
    meta: ComponentMeta,
    arguments: Vec<PromptArgument>,
    renderer: Arc<dyn PromptRenderer>,
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("meta", &self.meta)
            .field("arguments", &self.arguments)
            .finish()
    }
}

impl Prompt {
    /// Creates a prompt from a renderer.
    pub fn new<R: PromptRenderer + 'static>(name: impl Into<String>, renderer: R) -> Self {
        Self {
            meta: ComponentMeta::named(name),
            arguments: Vec::new(),
            renderer: Arc::new(renderer),
        }
    }

    /// Creates a prompt from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<PromptMessage>, PromptError>> + Send + 'static,
    {
        Self::new(name, FnRenderer(f))
    }

    /// Builds a prompt from a wire definition and the renderer that serves it.
    pub fn from_definition(definition: PromptDefinition, renderer: Arc<dyn PromptRenderer>) -> Self {
        Self {
            meta: ComponentMeta {
                name: definition.name,
                title: definition.title,
                description: definition.description,
                tags: definition.tags,
                meta: definition.meta,
                version: definition.version,
                ..ComponentMeta::default()
            },
            arguments: definition.arguments,
            renderer,
        }
    }

    /// Renders the wire definition.
    pub fn to_definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.meta.name.clone(),
            title: self.meta.title.clone(),
            description: self.meta.description.clone(),
            arguments: self.arguments.clone(),
            tags: self.meta.tags.clone(),
            version: self.meta.version.clone(),
            meta: self.meta.meta.clone(),
        }
    }

    /// Declares an argument.
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Returns the declared arguments.
    pub fn arguments(&self) -> &[PromptArgument] {
        &self.arguments
    }

    /// Returns a copy under a different name, sharing the renderer.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    /// Renders the prompt.
    ///
    /// # Errors
    ///
    /// `PromptError::MissingArgument` for the first required argument that
    /// is absent. Renderer failures propagate unchanged.
    pub async fn render(&self, arguments: Arguments, ctx: &CallContext) -> Result<Vec<PromptMessage>, PromptError> {
        if let Some(missing) = self
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(PromptError::MissingArgument(missing.name.clone()));
        }
        self.renderer.render(arguments, ctx).await
    }
}

impl Component for Prompt {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ComponentMeta {
        &mut self.meta
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Prompt
    }

    fn identifier(&self) -> &str {
        &self.meta.name
    }
}

struct FnRenderer<F>(F);

#[async_trait]
impl<F, Fut> PromptRenderer for FnRenderer<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<PromptMessage>, PromptError>> + Send + 'static,
{
    async fn render(&self, arguments: Arguments, _ctx: &CallContext) -> Result<Vec<PromptMessage>, PromptError> {
        (self.0)(arguments).await
    }
}
