//! Resource templates and URI template matching.
//!
//! Template syntax:
//! - `{name}` matches a single path segment
//! - `{name*}` matches the remainder of the path, slashes included
//! - `{?a,b}` (trailing) matches optional query parameters
//!
//! Captured values are percent-decoded.

use super::{Component, ComponentKind, ComponentMeta, Resource, ResourceContent, ResourceReader};
use crate::context::CallContext;
use crate::error::{ResourceError, TransformError};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Parameters extracted from a URI.
pub type TemplateParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, greedy: bool },
}

/// A compiled URI template.
///
/// # Examples
///
/// ```rust
/// use mcp_router::component::UriTemplate;
///
/// let template = UriTemplate::parse("weather://{city}/current").unwrap();
///
/// let params = template.matches("weather://New%20York/current").unwrap();
/// assert_eq!(params["city"], "New York");
/// assert!(template.matches("weather://a/b/current").is_none());
/// ```
#[derive(Clone)]
pub struct UriTemplate {
    template: String,
    segments: Vec<Segment>,
    query: Vec<String>,
    regex: Regex,
}

impl fmt::Debug for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UriTemplate").field(&self.template).finish()
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl UriTemplate {
    /// Compiles a template.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::InvalidUri` for unbalanced braces, invalid or
    /// repeated parameter names, or a query expression that is not last.
    pub fn parse(template: impl Into<String>) -> Result<Self, ResourceError> {
        let template = template.into();
        let invalid = |reason: &str| ResourceError::InvalidUri(format!("{}: {}", template, reason));

        let mut segments = Vec::new();
        let mut query = Vec::new();
        let mut seen = BTreeSet::new();
        let mut rest = template.as_str();

        while !rest.is_empty() {
            if !query.is_empty() {
                return Err(invalid("query expression must be last"));
            }
            match rest.find('{') {
                Some(0) => {
                    let close = rest.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    let expression = &rest[1..close];
                    rest = &rest[close + 1..];

                    if let Some(names) = expression.strip_prefix('?') {
                        for name in names.split(',').map(str::trim) {
                            if !is_valid_name(name) || !seen.insert(name.to_string()) {
                                return Err(invalid("invalid query parameter"));
                            }
                            query.push(name.to_string());
                        }
                        if query.is_empty() {
                            return Err(invalid("empty query expression"));
                        }
                        continue;
                    }

                    let (name, greedy) = match expression.strip_suffix('*') {
                        Some(name) => (name, true),
                        None => (expression, false),
                    };
                    if !is_valid_name(name) || !seen.insert(name.to_string()) {
                        return Err(invalid("invalid parameter name"));
                    }
                    segments.push(Segment::Param {
                        name: name.to_string(),
                        greedy,
                    });
                }
                Some(open) => {
                    segments.push(Segment::Literal(rest[..open].to_string()));
                    rest = &rest[open..];
                }
                None => {
                    if rest.contains('}') {
                        return Err(invalid("unbalanced '}'"));
                    }
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => {
                    if text.contains('}') {
                        return Err(invalid("unbalanced '}'"));
                    }
                    pattern.push_str(&regex::escape(text));
                }
                Segment::Param { name, greedy: false } => {
                    pattern.push_str(&format!("(?P<{}>[^/?#]+)", name));
                }
                Segment::Param { name, greedy: true } => {
                    pattern.push_str(&format!("(?P<{}>[^?#]+)", name));
                }
            }
        }
        if !query.is_empty() {
            pattern.push_str(r"(?:\?(?P<__query>[^#]*))?");
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            template,
            segments,
            query,
            regex,
        })
    }

    /// Returns the template string.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns path parameter names in order of appearance.
    pub fn path_parameters(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Returns query parameter names.
    pub fn query_parameters(&self) -> Vec<&str> {
        self.query.iter().map(String::as_str).collect()
    }

    /// Returns all parameter names.
    pub fn parameters(&self) -> BTreeSet<&str> {
        self.path_parameters()
            .into_iter()
            .chain(self.query_parameters())
            .collect()
    }

    /// Matches a URI, returning the decoded parameters.
    ///
    /// Query parameters are optional; absent ones are omitted from the map
    /// and undeclared ones are ignored.
    pub fn matches(&self, uri: &str) -> Option<TemplateParams> {
        let captures = self.regex.captures(uri)?;
        let mut params = TemplateParams::new();

        for name in self.path_parameters() {
            let raw = captures.name(name)?.as_str();
            params.insert(name.to_string(), decode(raw)?);
        }

        if let Some(query) = captures.name("__query") {
            for pair in query.as_str().split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = decode(key)?;
                if self.query.contains(&key) {
                    params.insert(key, decode(value)?);
                }
            }
        }

        Some(params)
    }

    /// Substitutes parameters back into the template.
    ///
    /// Values are percent-encoded; greedy parameters keep their slashes.
    /// Returns `None` when a path parameter is missing.
    ///
    /// ```rust
    /// use mcp_router::component::UriTemplate;
    /// use std::collections::BTreeMap;
    ///
    /// let template = UriTemplate::parse("files://{path*}{?rev}").unwrap();
    /// let mut params = BTreeMap::new();
    /// params.insert("path".to_string(), "docs/read me.md".to_string());
    /// params.insert("rev".to_string(), "3".to_string());
    ///
    /// assert_eq!(
    ///     template.expand(&params).unwrap(),
    ///     "files://docs/read%20me.md?rev=3"
    /// );
    /// ```
    pub fn expand(&self, params: &TemplateParams) -> Option<String> {
        let mut uri = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => uri.push_str(text),
                Segment::Param { name, greedy } => {
                    let value = params.get(name)?;
                    if *greedy {
                        let encoded: Vec<String> = value
                            .split('/')
                            .map(|part| urlencoding::encode(part).into_owned())
                            .collect();
                        uri.push_str(&encoded.join("/"));
                    } else {
                        uri.push_str(&urlencoding::encode(value));
                    }
                }
            }
        }

        let pairs: Vec<String> = self
            .query
            .iter()
            .filter_map(|name| {
                params
                    .get(name)
                    .map(|value| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
            })
            .collect();
        if !pairs.is_empty() {
            uri.push('?');
            uri.push_str(&pairs.join("&"));
        }
        Some(uri)
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

/// Produces content for a matched template URI.
#[async_trait]
pub trait TemplateReader: Send + Sync {
    /// Reads the resource identified by the extracted parameters.
    async fn read(&self, params: &TemplateParams, ctx: &CallContext) -> Result<ResourceContent, ResourceError>;
}

/// Wire description of a resource template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// URI template
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    /// Template name
    pub name: String,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of produced resources
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

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

/// A parameterized family of resources.
#[derive(Clone)]
pub struct ResourceTemplate {
    meta: ComponentMeta,
    template: UriTemplate,
    mime_type: Option<String>,
    parameters: Option<Value>,
    injected: BTreeSet<String>,
    reader: Arc<dyn TemplateReader>,
}

impl fmt::Debug for ResourceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTemplate")
            .field("meta", &self.meta)
            .field("uri_template", &self.template.as_str())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl ResourceTemplate {
    /// Creates a template from a reader. The name defaults to the template.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::InvalidUri` if the template does not parse.
    pub fn new<R: TemplateReader + 'static>(uri_template: impl Into<String>, reader: R) -> Result<Self, ResourceError> {
        let template = UriTemplate::parse(uri_template)?;
        Ok(Self {
            meta: ComponentMeta::named(template.as_str()),
            template,
            mime_type: None,
            parameters: None,
            injected: BTreeSet::new(),
            reader: Arc::new(reader),
        })
    }

    /// Creates a template from an async closure over the parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::{ResourceContent, ResourceTemplate};
    /// use mcp_router::context::CallContext;
    ///
    /// # tokio_test::block_on(async {
    /// let template = ResourceTemplate::from_fn("users://{id}/profile", |params| async move {
    ///     Ok(ResourceContent::text(format!("user {}", params["id"]), "text/plain"))
    /// })
    /// .unwrap();
    ///
    /// let content = template.read("users://42/profile", &CallContext::new()).await.unwrap();
    /// assert_eq!(content.as_text(), Some("user 42"));
    /// # });
    /// ```
    pub fn from_fn<F, Fut>(uri_template: impl Into<String>, f: F) -> Result<Self, ResourceError>
    where
        F: Fn(TemplateParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContent, ResourceError>> + Send + 'static,
    {
        Self::new(uri_template, FnTemplateReader(f))
    }

    /// Builds a template from a wire definition and the reader that serves it.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::InvalidUri` if the template does not parse.
    pub fn from_definition(
        definition: TemplateDefinition,
        reader: Arc<dyn TemplateReader>,
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            meta: ComponentMeta {
                name: definition.name,
                description: definition.description,
                tags: definition.tags,
                meta: definition.meta,
                version: definition.version,
                ..ComponentMeta::default()
            },
            template: UriTemplate::parse(definition.uri_template)?,
            mime_type: definition.mime_type,
            parameters: None,
            injected: BTreeSet::new(),
            reader,
        })
    }

    /// Renders the wire definition.
    pub fn to_definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            uri_template: self.template.as_str().to_string(),
            name: self.meta.name.clone(),
            description: self.meta.description.clone(),
            mime_type: self.mime_type.clone(),
            tags: self.meta.tags.clone(),
            version: self.meta.version.clone(),
            meta: self.meta.meta.clone(),
        }
    }

    /// Declares the handler's parameter schema and checks it against the
    /// URI template.
    ///
    /// # Errors
    ///
    /// `TransformError::TemplateParameterMismatch` when a URI parameter is not
    /// declared by the schema or names an injected argument, or a required
    /// schema parameter is supplied by neither the URI nor injection.
    pub fn with_parameters(mut self, schema: Value) -> Result<Self, TransformError> {
        let declared: BTreeSet<&str> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let required: BTreeSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let in_uri = self.template.parameters();
        self.check_injected_collisions(&in_uri)?;

        let undeclared: Vec<&str> = in_uri.difference(&declared).copied().collect();
        if !undeclared.is_empty() {
            return Err(TransformError::TemplateParameterMismatch(format!(
                "URI parameters {:?} are not handler parameters",
                undeclared
            )));
        }
        let unsupplied: Vec<&str> = required
            .difference(&in_uri)
            .copied()
            .filter(|name| !self.injected.contains(*name))
            .collect();
        if !unsupplied.is_empty() {
            return Err(TransformError::TemplateParameterMismatch(format!(
                "required handler parameters {:?} are missing from the URI template",
                unsupplied
            )));
        }

        self.parameters = Some(schema);
        Ok(self)
    }

    /// Declares arguments the reader receives from the call context
    /// metadata rather than from the URI.
    ///
    /// # Errors
    ///
    /// `TransformError::TemplateParameterMismatch` when a name is also a URI
    /// parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::{ResourceContent, ResourceTemplate};
    /// use mcp_router::context::CallContext;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let template = ResourceTemplate::from_fn("users://{id}", |params| async move {
    ///     Ok(ResourceContent::text(format!("{} as {}", params["id"], params["tenant"]), "text/plain"))
    /// })
    /// .unwrap()
    /// .with_injected(["tenant"])
    /// .unwrap();
    ///
    /// let ctx = CallContext::builder().metadata("tenant", json!("acme")).build();
    /// let content = template.read("users://7", &ctx).await.unwrap();
    /// assert_eq!(content.as_text(), Some("7 as acme"));
    ///
    /// assert!(template.clone().with_injected(["id"]).is_err());
    /// # });
    /// ```
    pub fn with_injected<I, S>(mut self, names: I) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.injected.extend(names.into_iter().map(Into::into));
        self.check_injected_collisions(&self.template.parameters())?;
        Ok(self)
    }

    /// Returns the injected argument names.
    pub fn injected(&self) -> &BTreeSet<String> {
        &self.injected
    }

    fn check_injected_collisions(&self, in_uri: &BTreeSet<&str>) -> Result<(), TransformError> {
        let colliding: Vec<&str> = in_uri
            .iter()
            .copied()
            .filter(|name| self.injected.contains(*name))
            .collect();
        if colliding.is_empty() {
            Ok(())
        } else {
            Err(TransformError::TemplateParameterMismatch(format!(
                "URI parameters {:?} collide with injected arguments",
                colliding
            )))
        }
    }

    /// Returns the URI template string.
    pub fn uri_template(&self) -> &str {
        self.template.as_str()
    }

    /// Returns the compiled template.
    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    /// Returns the declared parameter schema.
    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }

    /// Returns the MIME type.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Returns a copy with another template, sharing the reader.
    pub fn with_template(mut self, template: UriTemplate) -> Self {
        self.template = template;
        self
    }

    /// Parses a candidate URI against the template.
    pub fn matches(&self, uri: &str) -> Option<TemplateParams> {
        self.template.matches(uri)
    }

    /// Materializes the resource behind a matched URI.
    pub fn create_resource(&self, uri: impl Into<String>, params: TemplateParams) -> Resource {
        let mut resource = Resource::from_arc(
            uri,
            Arc::new(BoundTemplate {
                reader: self.reader.clone(),
                params,
                injected: self.injected.clone(),
            }),
        );
        {
            let meta = resource.meta_mut();
            meta.name = self.meta.name.clone();
            meta.title = self.meta.title.clone();
            meta.description = self.meta.description.clone();
            meta.tags = self.meta.tags.clone();
            meta.meta = self.meta.meta.clone();
            meta.version = self.meta.version.clone();
        }
        match &self.mime_type {
            Some(mime) => resource.with_mime_type(mime.clone()),
            None => resource,
        }
    }

    /// Reads the resource at `uri`.
    ///
    /// # Errors
    ///
    /// `ResourceError::NotFound` when the URI does not match the template.
    pub async fn read(&self, uri: &str, ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        let mut params = self
            .matches(uri)
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))?;
        inject_from_context(&mut params, &self.injected, ctx);
        self.reader.read(&params, ctx).await
    }
}

impl Component for ResourceTemplate {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ComponentMeta {
        &mut self.meta
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Template
    }

    fn identifier(&self) -> &str {
        self.template.as_str()
    }
}

/// Fills injected arguments from the context metadata. Missing entries are
/// left for the reader to handle.
fn inject_from_context(params: &mut TemplateParams, injected: &BTreeSet<String>, ctx: &CallContext) {
    for name in injected {
        if let Some(value) = ctx.get_metadata(name) {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            params.insert(name.clone(), value);
        }
    }
}

struct BoundTemplate {
    reader: Arc<dyn TemplateReader>,
    params: TemplateParams,
    injected: BTreeSet<String>,
}

#[async_trait]
impl ResourceReader for BoundTemplate {
    async fn read(&self, ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        let mut params = self.params.clone();
        inject_from_context(&mut params, &self.injected, ctx);
        self.reader.read(&params, ctx).await
    }
}

struct FnTemplateReader<F>(F);

#[async_trait]
impl<F, Fut> TemplateReader for FnTemplateReader<F>
where
    F: Fn(TemplateParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceContent, ResourceError>> + Send + 'static,
{
    async fn read(&self, params: &TemplateParams, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        (self.0)(params.clone()).await
    }
}
