//! Tools.
//!
//! A [`Tool`] is a cloneable definition (metadata, input schema, optional
//! output schema, annotations) paired with a shared [`ToolHandler`]. Cloning a
//! tool shares its handler, so renamed or prefixed copies still call the same
//! code.

use super::{Component, ComponentKind, ComponentMeta, ToolOutput, ToolResult};
use crate::context::CallContext;
use crate::error::ToolError;
use crate::transform::schema::{compress_schema, is_object_schema, wrap_output_schema, CompressOptions};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Tool call arguments: a JSON object keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Executes a tool call.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{Arguments, Tool, ToolHandler, ToolOutput};
/// use mcp_router::context::CallContext;
/// use mcp_router::error::ToolError;
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ToolHandler for Echo {
///     async fn call(&self, arguments: Arguments, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
///         Ok(arguments.get("message").cloned().unwrap_or_default().into())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let tool = Tool::new("echo", json!({"type": "object"}), Echo);
/// let mut args = Arguments::new();
/// args.insert("message".into(), json!("hi"));
/// let result = tool.run(args, &CallContext::new()).await.unwrap();
/// assert_eq!(result.first_text(), Some("hi"));
/// # });
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with already-resolved arguments.
    async fn call(&self, arguments: Arguments, ctx: &CallContext) -> Result<ToolOutput, ToolError>;
}

/// Behavioural hints advertised with a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The tool does not modify its environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,

    /// The tool may perform destructive updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,

    /// Repeated calls with the same arguments have no additional effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,

    /// The tool interacts with an open world of external entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// Wire description of a tool, as exchanged with upstream servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,

    /// JSON Schema of the structured result
    #[serde(default, rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Behavioural hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,

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

/// A callable tool.
#[derive(Clone)]
pub struct Tool {
    meta: ComponentMeta,
    input_schema: Value,
    output_schema: Option<Value>,
    annotations: Option<ToolAnnotations>,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("meta", &self.meta)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("annotations", &self.annotations)
            .field("handler", &"<dyn ToolHandler>")
            .finish()
    }
}

impl Tool {
    /// Creates a tool from a handler.
    pub fn new<H: ToolHandler + 'static>(name: impl Into<String>, input_schema: Value, handler: H) -> Self {
        Self::from_arc(name, input_schema, Arc::new(handler))
    }

    /// Creates a tool from a shared handler.
    pub fn from_arc(name: impl Into<String>, input_schema: Value, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            meta: ComponentMeta::named(name),
            input_schema,
            output_schema: None,
            annotations: None,
            handler,
        }
    }

    /// Creates a tool from an async closure over the argument map.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::Tool;
    /// use mcp_router::context::CallContext;
    /// use serde_json::json;
    ///
    /// let add = Tool::from_fn(
    ///     "add",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {"a": {"type": "integer"}, "b": {"type": "integer", "default": 10}},
    ///         "required": ["a"]
    ///     }),
    ///     |args| async move {
    ///         let a = args["a"].as_i64().unwrap_or_default();
    ///         let b = args["b"].as_i64().unwrap_or_default();
    ///         Ok(json!(a + b))
    ///     },
    /// );
    ///
    /// # tokio_test::block_on(async {
    /// let args = json!({"a": 1}).as_object().cloned().unwrap();
    /// let result = add.run(args, &CallContext::new()).await.unwrap();
    /// assert_eq!(result.first_text(), Some("11"));
    /// # });
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<String>, input_schema: Value, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::new(name, input_schema, FnHandler(f))
    }

    /// Creates a tool whose input and output schemas are derived from Rust
    /// types.
    ///
    /// Non-object outputs get a wrapped output schema, so their structured
    /// content is `{"result": value}`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::Tool;
    /// use mcp_router::context::CallContext;
    /// use serde_json::json;
    ///
    /// #[derive(serde::Deserialize, schemars::JsonSchema)]
    /// struct AddInput { a: i64, b: i64 }
    ///
    /// let add = Tool::typed("add", |input: AddInput| async move { Ok(input.a + input.b) });
    ///
    /// # tokio_test::block_on(async {
    /// let args = json!({"a": 2, "b": 3}).as_object().cloned().unwrap();
    /// let result = add.run(args, &CallContext::new()).await.unwrap();
    /// assert_eq!(result.structured_content, Some(json!({"result": 5})));
    /// # });
    /// ```
    pub fn typed<I, O, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    {
        let input_schema = derived_schema(serde_json::to_value(schemars::schema_for!(I)).unwrap_or_default());
        let output_schema = output_schema_for(serde_json::to_value(schemars::schema_for!(O)).unwrap_or_default());

        let mut tool = Self::new(
            name,
            input_schema,
            TypedHandler {
                f,
                _types: PhantomData,
            },
        );
        tool.output_schema = output_schema;
        tool
    }

    /// Builds a tool from a wire definition and the handler that serves it.
    pub fn from_definition(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
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
            input_schema: definition.input_schema,
            output_schema: definition.output_schema,
            annotations: definition.annotations,
            handler,
        }
    }

    /// Renders the wire definition.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.meta.name.clone(),
            title: self.meta.title.clone(),
            description: self.meta.description.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            annotations: self.annotations.clone(),
            tags: self.meta.tags.clone(),
            version: self.meta.version.clone(),
            meta: self.meta.meta.clone(),
        }
    }

    /// Returns the JSON Schema of the arguments.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the JSON Schema of the structured result.
    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Returns the behavioural hints.
    pub fn annotations(&self) -> Option<&ToolAnnotations> {
        self.annotations.as_ref()
    }

    /// Returns the shared handler.
    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }

    /// Sets the output schema as given.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Clears the output schema.
    pub fn without_output_schema(mut self) -> Self {
        self.output_schema = None;
        self
    }

    /// Sets the behavioural hints.
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Returns a copy under a different name, sharing the handler.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub(crate) fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub(crate) fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub(crate) fn set_output_schema(&mut self, schema: Option<Value>) {
        self.output_schema = schema;
    }

    /// Runs the tool.
    ///
    /// Arguments missing from the call are filled from `default` values in
    /// the input schema before the handler sees them. A raw handler value is
    /// converted against the output schema.
    pub async fn run(&self, mut arguments: Arguments, ctx: &CallContext) -> Result<ToolResult, ToolError> {
        apply_schema_defaults(&mut arguments, &self.input_schema);
        let output = self.handler.call(arguments, ctx).await?;
        Ok(output.into_result(self.output_schema.as_ref()))
    }
}

impl Component for Tool {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ComponentMeta {
        &mut self.meta
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Tool
    }

    fn identifier(&self) -> &str {
        &self.meta.name
    }
}

/// Copies `default` values of absent properties into the arguments.
pub(crate) fn apply_schema_defaults(arguments: &mut Arguments, schema: &Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, property) in properties {
        if arguments.contains_key(name) {
            continue;
        }
        if let Some(default) = property.get("default") {
            arguments.insert(name.clone(), default.clone());
        }
    }
}

fn derived_schema(mut schema: Value) -> Value {
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    if schema.is_null() || schema == Value::Bool(true) {
        return json!({"type": "object", "properties": {}});
    }
    let options = CompressOptions {
        prune_titles: true,
        ..CompressOptions::default()
    };
    compress_schema(&schema, &options).unwrap_or(schema)
}

fn output_schema_for(schema: Value) -> Option<Value> {
    let schema = derived_schema(schema);
    if schema.get("type") == Some(&json!("null")) {
        return None;
    }
    if is_object_schema(&schema) {
        Some(schema)
    } else {
        Some(wrap_output_schema(schema))
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Arguments, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        (self.0)(arguments).await.map(ToolOutput::Value)
    }
}

struct TypedHandler<I, O, F> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<I, O, F, Fut> ToolHandler for TypedHandler<I, O, F>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Arguments, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let input: I = serde_json::from_value(Value::Object(arguments))?;
        let output = (self.f)(input).await?;
        Ok(ToolOutput::Value(serde_json::to_value(output)?))
    }
}
