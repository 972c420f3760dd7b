//! Tool transformation.
//!
//! A [`ToolTransform`] computes a new tool from a parent tool: a different
//! name or description, renamed or hidden arguments, new defaults, a new
//! output schema, or a custom function that wraps the parent call. The parent
//! is never modified; the result shares its handler through a forwarding
//! layer, so transformations chain:
//!
//! ```
//! use mcp_router::component::{Component, Tool};
//! use mcp_router::context::CallContext;
//! use mcp_router::transform::{ArgTransform, ToolTransform};
//! use serde_json::{json, Map};
//!
//! # tokio_test::block_on(async {
//! let add = Tool::from_fn(
//!     "add",
//!     json!({
//!         "type": "object",
//!         "properties": {"x": {"type": "integer"}, "y": {"type": "integer"}},
//!         "required": ["x", "y"]
//!     }),
//!     |args| async move {
//!         Ok(json!(args["x"].as_i64().unwrap_or(0) + args["y"].as_i64().unwrap_or(0)))
//!     },
//! );
//!
//! let add_ten = add
//!     .transform(
//!         &ToolTransform::new()
//!             .with_name("add_ten")
//!             .with_argument("y", ArgTransform::new().hidden().with_default(json!(10))),
//!     )
//!     .unwrap();
//!
//! assert_eq!(add_ten.name(), "add_ten");
//! assert!(add_ten.input_schema()["properties"].get("y").is_none());
//!
//! let mut args = Map::new();
//! args.insert("x".into(), json!(3));
//! let result = add_ten.run(args, &CallContext::new()).await.unwrap();
//! assert_eq!(result.first_text(), Some("13"));
//! # });
//! ```

pub mod schema;

pub use schema::{
    compress_schema, dereference_refs, is_object_schema, is_wrapped_output, merge_schemas, prune_param,
    prune_unused_defs, resolve_root_ref, wrap_output_schema, CompressOptions, WRAP_MARKER,
};

use crate::component::{
    apply_schema_defaults, Arguments, Component, Tool, ToolAnnotations, ToolHandler, ToolOutput,
};
use crate::context::CallContext;
use crate::error::{ToolError, TransformError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Produces a fresh default value per call.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// How one parent argument is exposed by the transformed tool.
///
/// Unset fields keep the parent's definition.
#[derive(Clone, Default)]
pub struct ArgTransform {
    /// New external name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New default value
    pub default: Option<Value>,
    /// Per-call default, only for hidden arguments
    pub default_factory: Option<DefaultFactory>,
    /// Replacement schema for the argument
    pub type_schema: Option<Value>,
    /// Example values
    pub examples: Option<Value>,
    /// Remove the argument from the external schema
    pub hide: bool,
    /// Force the argument to be required
    pub required: bool,
}

impl fmt::Debug for ArgTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgTransform")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("default", &self.default)
            .field("default_factory", &self.default_factory.as_ref().map(|_| "<fn>"))
            .field("type_schema", &self.type_schema)
            .field("examples", &self.examples)
            .field("hide", &self.hide)
            .field("required", &self.required)
            .finish()
    }
}

impl ArgTransform {
    /// Creates a transform that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes the argument under another name.
    pub fn renamed(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    /// Sets the external name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets a per-call default factory.
    pub fn with_default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default_factory = Some(Arc::new(factory));
        self
    }

    /// Replaces the argument schema.
    pub fn with_type(mut self, schema: Value) -> Self {
        self.type_schema = Some(schema);
        self
    }

    /// Sets example values.
    pub fn with_examples(mut self, examples: Value) -> Self {
        self.examples = Some(examples);
        self
    }

    /// Hides the argument.
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    /// Makes the argument required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Checks the field combination for the argument `arg`.
    ///
    /// # Errors
    ///
    /// The `TransformError` variant naming the conflicting combination.
    pub fn validate(&self, arg: &str) -> Result<(), TransformError> {
        let has_default = self.default.is_some() || self.default_factory.is_some();
        if self.default.is_some() && self.default_factory.is_some() {
            return Err(TransformError::ConflictingDefaults(arg.to_string()));
        }
        if self.default_factory.is_some() && !self.hide {
            return Err(TransformError::FactoryRequiresHide(arg.to_string()));
        }
        if self.hide && self.required {
            return Err(TransformError::HiddenRequired(arg.to_string()));
        }
        if self.required && has_default {
            return Err(TransformError::RequiredWithDefault(arg.to_string()));
        }
        Ok(())
    }
}

/// A custom function that replaces the body of a transformed tool.
#[async_trait]
pub trait TransformHandler: Send + Sync {
    /// Handles a call. `forward` reaches the parent tool.
    async fn call(&self, arguments: Arguments, forward: Forward) -> Result<ToolOutput, ToolError>;
}

/// A custom function plus the schemas it declares.
#[derive(Clone)]
pub struct TransformFn {
    handler: Arc<dyn TransformHandler>,
    parameters: Option<Value>,
    accepts_extra: bool,
    output_schema: Option<Value>,
}

impl fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformFn")
            .field("parameters", &self.parameters)
            .field("accepts_extra", &self.accepts_extra)
            .field("output_schema", &self.output_schema)
            .finish()
    }
}

impl TransformFn {
    /// Wraps a handler.
    pub fn new<H: TransformHandler + 'static>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            parameters: None,
            accepts_extra: true,
            output_schema: None,
        }
    }

    /// Wraps an async closure.
    ///
    /// ```
    /// use mcp_router::transform::TransformFn;
    /// use serde_json::json;
    ///
    /// let doubled = TransformFn::from_fn(|args, forward| async move {
    ///     let output = forward.call(args).await?;
    ///     Ok(output)
    /// })
    /// .with_output_schema(json!({"type": "integer"}));
    /// ```
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments, Forward) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self::new(FnTransform(f))
    }

    /// Declares the function's own parameters.
    ///
    /// Unless `accepts_extra` is set, every parameter the transformed tool
    /// exposes must be declared here.
    pub fn with_parameters(mut self, schema: Value, accepts_extra: bool) -> Self {
        self.parameters = Some(schema);
        self.accepts_extra = accepts_extra;
        self
    }

    /// Declares the function's return schema.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

struct FnTransform<F>(F);

#[async_trait]
impl<F, Fut> TransformHandler for FnTransform<F>
where
    F: Fn(Arguments, Forward) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Arguments, forward: Forward) -> Result<ToolOutput, ToolError> {
        (self.0)(arguments, forward).await
    }
}

/// Handle through which a custom function reaches the parent tool.
#[derive(Clone)]
pub struct Forward {
    target: Arc<ForwardTarget>,
    ctx: CallContext,
}

impl fmt::Debug for Forward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forward")
            .field("parent", &self.target.parent.name())
            .finish()
    }
}

impl Forward {
    /// Calls the parent with external argument names.
    ///
    /// Names are mapped back to the parent's, and hidden arguments receive
    /// their bound defaults.
    ///
    /// # Errors
    ///
    /// `ToolError::UnexpectedArguments` for names the transformed tool does
    /// not expose; otherwise whatever the parent returns.
    pub async fn call(&self, arguments: Arguments) -> Result<ToolOutput, ToolError> {
        let mapped = self.target.map_arguments(arguments)?;
        self.target.invoke(mapped, &self.ctx).await
    }

    /// Calls the parent with the arguments exactly as given.
    pub async fn forward_raw(&self, arguments: Arguments) -> Result<ToolOutput, ToolError> {
        self.target.invoke(arguments, &self.ctx).await
    }

    /// Returns the context of the current call.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }
}

#[derive(Clone)]
enum Bound {
    Value(Value),
    Factory(DefaultFactory),
}

struct ForwardTarget {
    parent: Tool,
    /// External name to parent name
    mapping: BTreeMap<String, String>,
    /// Hidden parent arguments with their bound values
    hidden: Vec<(String, Bound)>,
}

impl ForwardTarget {
    fn map_arguments(&self, arguments: Arguments) -> Result<Arguments, ToolError> {
        let mut unexpected: Vec<String> = arguments
            .keys()
            .filter(|name| !self.mapping.contains_key(*name))
            .cloned()
            .collect();
        unexpected.sort();
        if !unexpected.is_empty() {
            return Err(ToolError::UnexpectedArguments(unexpected));
        }

        let mut mapped = Map::new();
        for (name, value) in arguments {
            if let Some(parent_name) = self.mapping.get(&name) {
                mapped.insert(parent_name.clone(), value);
            }
        }
        for (parent_name, bound) in &self.hidden {
            let value = match bound {
                Bound::Value(value) => value.clone(),
                Bound::Factory(factory) => factory(),
            };
            mapped.insert(parent_name.clone(), value);
        }
        Ok(mapped)
    }

    async fn invoke(&self, mut arguments: Arguments, ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        apply_schema_defaults(&mut arguments, self.parent.input_schema());
        self.parent.handler().call(arguments, ctx).await
    }
}

struct TransformedHandler {
    target: Arc<ForwardTarget>,
    function: Option<Arc<dyn TransformHandler>>,
    accepted: BTreeSet<String>,
}

#[async_trait]
impl ToolHandler for TransformedHandler {
    async fn call(&self, arguments: Arguments, ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let mut unexpected: Vec<String> = arguments
            .keys()
            .filter(|name| !self.accepted.contains(*name))
            .cloned()
            .collect();
        unexpected.sort();
        if !unexpected.is_empty() {
            return Err(ToolError::UnexpectedArguments(unexpected));
        }

        let forward = Forward {
            target: self.target.clone(),
            ctx: ctx.clone(),
        };
        match &self.function {
            Some(function) => function.call(arguments, forward).await,
            None => forward.call(arguments).await,
        }
    }
}

/// A declarative rewrite of a tool.
///
/// Unset fields pass the parent's values through. Transforms are keyed by
/// the parent's name when stored in a registry and applied at read time.
#[derive(Clone, Default)]
pub struct ToolTransform {
    /// New name
    pub name: Option<String>,
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replacement tag set
    pub tags: Option<BTreeSet<String>>,
    /// Replacement metadata
    pub meta: Option<Map<String, Value>>,
    /// Replacement annotations
    pub annotations: Option<ToolAnnotations>,
    /// Explicit output schema, must describe an object
    pub output_schema: Option<Value>,
    /// Per-argument rewrites keyed by parent argument name
    pub arguments: BTreeMap<String, ArgTransform>,
    /// Custom function replacing the call body
    pub transform_fn: Option<TransformFn>,
}

impl fmt::Debug for ToolTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolTransform")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("output_schema", &self.output_schema)
            .field("arguments", &self.arguments)
            .field("transform_fn", &self.transform_fn)
            .finish()
    }
}

impl ToolTransform {
    /// Creates an identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the new name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the new title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the new description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the tag set.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the metadata map.
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Replaces the annotations.
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Sets an explicit output schema.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Adds an argument rewrite.
    pub fn with_argument(mut self, parent_name: impl Into<String>, transform: ArgTransform) -> Self {
        self.arguments.insert(parent_name.into(), transform);
        self
    }

    /// Installs a custom function.
    pub fn with_function(mut self, function: TransformFn) -> Self {
        self.transform_fn = Some(function);
        self
    }

    /// Builds the transformed tool.
    ///
    /// # Errors
    ///
    /// Any `TransformError`: invalid argument rewrites, unknown or colliding
    /// argument names, a hidden required argument with no default, a custom
    /// function missing parameters, a non-object explicit output schema, or a
    /// schema that fails to merge. The parent is left untouched.
    pub fn apply(&self, parent: &Tool) -> Result<Tool, TransformError> {
        for (name, transform) in &self.arguments {
            transform.validate(name)?;
        }

        let parent_schema = resolve_root_ref(parent.input_schema().clone());
        let empty = Map::new();
        let parent_properties = parent_schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let parent_required: Vec<&str> = parent_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let unknown: Vec<String> = self
            .arguments
            .keys()
            .filter(|name| !parent_properties.contains_key(*name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(TransformError::UnknownArguments {
                tool: parent.name().to_string(),
                names: unknown,
            });
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut mapping = BTreeMap::new();
        let mut hidden = Vec::new();
        let mut duplicates = BTreeSet::new();

        for (parent_name, parent_property) in parent_properties {
            let transform = self.arguments.get(parent_name).cloned().unwrap_or_default();
            let was_required = parent_required.contains(&parent_name.as_str());

            if transform.hide {
                let bound = match (&transform.default, &transform.default_factory) {
                    (Some(value), _) => Some(Bound::Value(value.clone())),
                    (None, Some(factory)) => Some(Bound::Factory(factory.clone())),
                    (None, None) => None,
                };
                match bound {
                    Some(bound) => hidden.push((parent_name.clone(), bound)),
                    None if was_required && parent_property.get("default").is_none() => {
                        return Err(TransformError::HiddenWithoutDefault(parent_name.clone()));
                    }
                    None => {}
                }
                continue;
            }

            let external = transform.name.clone().unwrap_or_else(|| parent_name.clone());
            let mut property = transform.type_schema.clone().unwrap_or_else(|| parent_property.clone());
            if let Some(object) = property.as_object_mut() {
                if let Some(description) = &transform.description {
                    object.insert("description".to_string(), Value::String(description.clone()));
                }
                if let Some(default) = &transform.default {
                    object.insert("default".to_string(), default.clone());
                }
                if let Some(examples) = &transform.examples {
                    object.insert("examples".to_string(), examples.clone());
                }
                if transform.required {
                    object.remove("default");
                }
            }

            let is_required = transform.required || (was_required && transform.default.is_none());
            if is_required {
                required.push((parent_name.clone(), external.clone()));
            }
            if properties.insert(external.clone(), property).is_some() {
                duplicates.insert(external.clone());
            }
            mapping.insert(external, parent_name.clone());
        }

        if !duplicates.is_empty() {
            return Err(TransformError::DuplicateArgumentNames(duplicates.into_iter().collect()));
        }

        // Parent order first; arguments made required here follow in property order.
        required.sort_by_key(|(parent_name, _)| {
            parent_required
                .iter()
                .position(|name| *name == parent_name.as_str())
                .unwrap_or(usize::MAX)
        });
        let required: Vec<Value> = required.into_iter().map(|(_, external)| Value::String(external)).collect();

        let mut input_schema = parent_schema.as_object().cloned().unwrap_or_default();
        input_schema.insert("type".to_string(), Value::String("object".to_string()));
        input_schema.insert("properties".to_string(), Value::Object(properties));
        if required.is_empty() {
            input_schema.remove("required");
        } else {
            input_schema.insert("required".to_string(), Value::Array(required));
        }
        let mut input_schema = dereference_refs(&prune_unused_defs(Value::Object(input_schema)))?;

        if let Some(function) = &self.transform_fn {
            if let Some(parameters) = &function.parameters {
                if !function.accepts_extra {
                    let declared: BTreeSet<&String> = parameters
                        .get("properties")
                        .and_then(Value::as_object)
                        .map(|p| p.keys().collect())
                        .unwrap_or_default();
                    let missing: Vec<String> = mapping.keys().filter(|name| !declared.contains(name)).cloned().collect();
                    if !missing.is_empty() {
                        return Err(TransformError::MissingFunctionParameters(missing));
                    }
                }
                input_schema = merge_schemas(&input_schema, parameters)?;
            }
        }

        let output_schema = match (&self.output_schema, &self.transform_fn) {
            (Some(explicit), _) => {
                if !is_object_schema(explicit) {
                    return Err(TransformError::InvalidOutputSchema(explicit.to_string()));
                }
                Some(explicit.clone())
            }
            (None, Some(TransformFn {
                output_schema: Some(returned),
                ..
            })) => Some(if is_object_schema(returned) {
                returned.clone()
            } else {
                wrap_output_schema(returned.clone())
            }),
            (None, _) => parent.output_schema().cloned(),
        };

        let accepted: BTreeSet<String> = input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        let handler = TransformedHandler {
            target: Arc::new(ForwardTarget {
                parent: parent.clone(),
                mapping,
                hidden,
            }),
            function: self.transform_fn.as_ref().map(|f| f.handler.clone()),
            accepted,
        };

        let mut tool = parent
            .clone()
            .with_input_schema(input_schema)
            .with_handler(Arc::new(handler));
        tool.set_output_schema(output_schema);
        if let Some(annotations) = &self.annotations {
            tool = tool.with_annotations(annotations.clone());
        }

        let meta = tool.meta_mut();
        if let Some(name) = &self.name {
            meta.name = name.clone();
        }
        if let Some(title) = &self.title {
            meta.title = Some(title.clone());
        }
        if let Some(description) = &self.description {
            meta.description = Some(description.clone());
        }
        if let Some(tags) = &self.tags {
            meta.tags = tags.clone();
        }
        if let Some(extra) = &self.meta {
            meta.meta = extra.clone();
        }
        Ok(tool)
    }
}

impl Tool {
    /// Applies a transform, returning the new tool.
    ///
    /// # Errors
    ///
    /// See [`ToolTransform::apply`].
    pub fn transform(&self, transform: &ToolTransform) -> Result<Tool, TransformError> {
        transform.apply(self)
    }
}

/// Serializable form of an [`ArgTransform`], for configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgTransformConfig {
    /// New external name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Replacement schema
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_schema: Option<Value>,
    /// Example values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Value>,
    /// Hide the argument
    #[serde(default)]
    pub hide: bool,
    /// Force the argument to be required
    #[serde(default)]
    pub required: bool,
}

impl From<ArgTransformConfig> for ArgTransform {
    fn from(config: ArgTransformConfig) -> Self {
        Self {
            name: config.name,
            description: config.description,
            default: config.default,
            default_factory: None,
            type_schema: config.type_schema,
            examples: config.examples,
            hide: config.hide,
            required: config.required,
        }
    }
}

/// Serializable form of a [`ToolTransform`] without a custom function.
///
/// ```
/// use mcp_router::transform::{ToolTransform, ToolTransformConfig};
///
/// let config: ToolTransformConfig = serde_json::from_str(r#"{
///     "name": "search_docs",
///     "arguments": {"q": {"name": "query", "description": "Search text"}}
/// }"#).unwrap();
/// let transform = ToolTransform::from(config);
/// assert_eq!(transform.arguments["q"].name.as_deref(), Some("query"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTransformConfig {
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement tag set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    /// Replacement metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Replacement annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
    /// Explicit output schema
    #[serde(default, rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Per-argument rewrites
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, ArgTransformConfig>,
}

impl From<ToolTransformConfig> for ToolTransform {
    fn from(config: ToolTransformConfig) -> Self {
        Self {
            name: config.name,
            title: config.title,
            description: config.description,
            tags: config.tags,
            meta: config.meta,
            annotations: config.annotations,
            output_schema: config.output_schema,
            arguments: config.arguments.into_iter().map(|(k, v)| (k, v.into())).collect(),
            transform_fn: None,
        }
    }
}
