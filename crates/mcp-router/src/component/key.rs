//! Component keys.
//!
//! A [`Key`] is the stable identity of a component: its kind, its identifier
//! (a name for tools and prompts, a URI or URI template for resources) and an
//! optional version. Keys render as `kind:identifier[@version]`.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four kinds of component a provider can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Callable tool
    Tool,
    /// Concrete resource addressed by URI
    Resource,
    /// Resource template addressed by URI template
    #[serde(rename = "template", alias = "resource-template")]
    Template,
    /// Prompt
    Prompt,
}

impl ComponentKind {
    /// All kinds, in listing order.
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Tool,
        ComponentKind::Resource,
        ComponentKind::Template,
        ComponentKind::Prompt,
    ];

    /// Returns the key prefix for this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::ComponentKind;
    ///
    /// assert_eq!(ComponentKind::Template.as_str(), "template");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Tool => "tool",
            ComponentKind::Resource => "resource",
            ComponentKind::Template => "template",
            ComponentKind::Prompt => "prompt",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(ComponentKind::Tool),
            "resource" => Ok(ComponentKind::Resource),
            "template" | "resource-template" => Ok(ComponentKind::Template),
            "prompt" => Ok(ComponentKind::Prompt),
            other => Err(RegistryError::InvalidKey(format!("unknown kind '{}'", other))),
        }
    }
}

/// Identity of a stored component.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{ComponentKind, Key};
///
/// let key = Key::tool("greet").with_version("1.2.0");
/// assert_eq!(key.to_string(), "tool:greet@1.2.0");
///
/// let parsed: Key = "resource:data://config".parse().unwrap();
/// assert_eq!(parsed.kind(), ComponentKind::Resource);
/// assert_eq!(parsed.identifier(), "data://config");
/// assert_eq!(parsed.version(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: ComponentKind,
    identifier: String,
    version: Option<String>,
}

impl Key {
    /// Creates a key from its parts.
    pub fn new(kind: ComponentKind, identifier: impl Into<String>, version: Option<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            version,
        }
    }

    /// Key for an unversioned tool.
    pub fn tool(name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Tool, name, None)
    }

    /// Key for an unversioned resource.
    pub fn resource(uri: impl Into<String>) -> Self {
        Self::new(ComponentKind::Resource, uri, None)
    }

    /// Key for an unversioned resource template.
    pub fn template(uri_template: impl Into<String>) -> Self {
        Self::new(ComponentKind::Template, uri_template, None)
    }

    /// Key for an unversioned prompt.
    pub fn prompt(name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Prompt, name, None)
    }

    /// Returns the same key with a version attached.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the component kind.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Returns the name, URI or URI template.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns `true` when `other` names the same component.
    ///
    /// An unversioned key matches every version of its identifier.
    ///
    /// ```
    /// use mcp_router::component::Key;
    ///
    /// let any = Key::tool("greet");
    /// assert!(any.covers(&Key::tool("greet").with_version("2")));
    /// assert!(!Key::tool("greet").with_version("1").covers(&any));
    /// ```
    pub fn covers(&self, other: &Key) -> bool {
        self.kind == other.kind
            && self.identifier == other.identifier
            && (self.version.is_none() || self.version == other.version)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| RegistryError::InvalidKey(s.to_string()))?;
        let kind: ComponentKind = kind.parse()?;

        let (identifier, version) = match rest.rsplit_once('@') {
            Some((identifier, "")) => (identifier, None),
            Some((identifier, version)) if !version.contains('/') => {
                (identifier, Some(version.to_string()))
            }
            _ => (rest, None),
        };

        if identifier.is_empty() {
            return Err(RegistryError::InvalidKey(s.to_string()));
        }

        Ok(Key::new(kind, identifier, version))
    }
}

impl Serialize for Key {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
