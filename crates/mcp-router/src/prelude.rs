//! Convenient re-exports for common use cases.
//!
//! ```rust
//! use mcp_router::prelude::*;
//! ```

// Core types
pub use crate::error::{
    PromptError, ProviderError, RegistryError, ResourceError, Result, RouterError, ToolError, TransformError,
    VisibilityError,
};

// Components
pub use crate::component::{
    AnyComponent, Arguments, Component, ComponentKind, Content, Key, Prompt, PromptArgument, PromptMessage,
    Resource, ResourceContent, ResourceTemplate, TaskMode, Tool, ToolResult, VersionSpec,
};

// Composition
pub use crate::config::{DuplicatePolicy, RouterConfig};
pub use crate::provider::{MountedProvider, Provider, ProxyProvider, Upstream};
#[cfg(feature = "skills")]
pub use crate::provider::SkillsProvider;
pub use crate::registry::LocalRegistry;
pub use crate::router::Router;

// Transformation
pub use crate::transform::{ArgTransform, ToolTransform};

// Visibility and notifications
pub use crate::context::{CallContext, Session};
pub use crate::notify::Notification;
pub use crate::visibility::{RuleMatch, VisibilityRule};

// External re-exports for convenience
pub use async_trait::async_trait;
