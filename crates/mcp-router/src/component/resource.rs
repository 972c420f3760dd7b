//! Concrete resources addressed by URI.

use super::{Component, ComponentKind, ComponentMeta};
use crate::context::CallContext;
use crate::error::ResourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Resource content returned by read operations.
///
/// # Examples
///
/// ```rust
/// use mcp_router::component::ResourceContent;
///
/// let content = ResourceContent::text("Hello, World!", "text/plain");
/// assert_eq!(content.as_text(), Some("Hello, World!"));
///
/// let blob = ResourceContent::blob(vec![0x89, 0x50], "image/png");
/// assert_eq!(blob.mime_type(), "image/png");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceContent {
    /// UTF-8 text
    Text {
        /// The text
        text: String,
        /// MIME type
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Arbitrary bytes
    Blob {
        /// The data
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        /// MIME type
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ResourceContent {
    /// Creates text content.
    pub fn text(text: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Creates binary content.
    pub fn blob(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Blob {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Returns the text if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Blob { .. } => None,
        }
    }

    /// Returns the bytes if this is binary content.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob { data, .. } => Some(data),
            Self::Text { .. } => None,
        }
    }

    /// Returns the MIME type.
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Text { mime_type, .. } | Self::Blob { mime_type, .. } => mime_type,
        }
    }
}

/// Produces the content of a resource.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Reads the resource.
    async fn read(&self, ctx: &CallContext) -> Result<ResourceContent, ResourceError>;
}

/// Wire description of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource URI
    pub uri: String,

    /// Resource name
    pub name: String,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type
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

/// A concrete resource.
#[derive(Clone)]
pub struct Resource {
    meta: ComponentMeta,
    uri: String,
    mime_type: Option<String>,
    reader: Arc<dyn ResourceReader>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("meta", &self.meta)
            .field("uri", &self.uri)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl Resource {
    /// Creates a resource from a reader. The name defaults to the URI.
    pub fn new<R: ResourceReader + 'static>(uri: impl Into<String>, reader: R) -> Self {
        Self::from_arc(uri, Arc::new(reader))
    }

    /// Creates a resource from a shared reader.
    pub fn from_arc(uri: impl Into<String>, reader: Arc<dyn ResourceReader>) -> Self {
        let uri = uri.into();
        Self {
            meta: ComponentMeta::named(uri.clone()),
            uri,
            mime_type: None,
            reader,
        }
    }

    /// Creates a resource with fixed text content.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::Resource;
    /// use mcp_router::context::CallContext;
    ///
    /// # tokio_test::block_on(async {
    /// let resource = Resource::text("data://greeting", "hello");
    /// let content = resource.read(&CallContext::new()).await.unwrap();
    /// assert_eq!(content.as_text(), Some("hello"));
    /// # });
    /// ```
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        let content = ResourceContent::text(text, "text/plain");
        Self::new(uri, StaticContent(content)).with_mime_type("text/plain")
    }

    /// Creates a resource from an async closure.
    pub fn from_fn<F, Fut>(uri: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContent, ResourceError>> + Send + 'static,
    {
        Self::new(uri, FnReader(f))
    }

    /// Builds a resource from a wire definition and the reader that serves it.
    pub fn from_definition(definition: ResourceDefinition, reader: Arc<dyn ResourceReader>) -> Self {
        Self {
            meta: ComponentMeta {
                name: definition.name,
                description: definition.description,
                tags: definition.tags,
                meta: definition.meta,
                version: definition.version,
                ..ComponentMeta::default()
            },
            uri: definition.uri,
            mime_type: definition.mime_type,
            reader,
        }
    }

    /// Renders the wire definition.
    pub fn to_definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri.clone(),
            name: self.meta.name.clone(),
            description: self.meta.description.clone(),
            mime_type: self.mime_type.clone(),
            tags: self.meta.tags.clone(),
            version: self.meta.version.clone(),
            meta: self.meta.meta.clone(),
        }
    }

    /// Returns the URI.
    pub fn uri(&self) -> &str {
        &self.uri
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

    /// Returns a copy at a different URI, sharing the reader.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Reads the content.
    pub async fn read(&self, ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        self.reader.read(ctx).await
    }
}

impl Component for Resource {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ComponentMeta {
        &mut self.meta
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Resource
    }

    fn identifier(&self) -> &str {
        &self.uri
    }
}

struct StaticContent(ResourceContent);

#[async_trait]
impl ResourceReader for StaticContent {
    async fn read(&self, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        Ok(self.0.clone())
    }
}

struct FnReader<F>(F);

#[async_trait]
impl<F, Fut> ResourceReader for FnReader<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceContent, ResourceError>> + Send + 'static,
{
    async fn read(&self, _ctx: &CallContext) -> Result<ResourceContent, ResourceError> {
        (self.0)().await
    }
}
