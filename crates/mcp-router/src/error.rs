//! Error types for the routing layer.
//!
//! Every concern gets its own error enum; [`RouterError`] is the umbrella type
//! returned by router-level operations.
//!
//! # Error Hierarchy
//!
//! ```text
//! RouterError (top-level)
//! ├── Registry(RegistryError)
//! ├── Tool(ToolError)
//! ├── Resource(ResourceError)
//! ├── Prompt(PromptError)
//! ├── Transform(TransformError)
//! ├── Schema(SchemaError)
//! ├── Provider(ProviderError)
//! ├── Visibility(VisibilityError)
//! └── Config(String)
//! ```
//!
//! Ordinary misses are never errors: lookups return `Option`. Only operations
//! that must produce something (calling a tool, reading a resource, rendering
//! a prompt) turn a miss into a typed `NotFound`.
//!
//! # Examples
//!
//! ```rust
//! use mcp_router::error::{RouterError, ToolError};
//!
//! fn may_fail() -> Result<(), RouterError> {
//!     Err(ToolError::NotFound("my_tool".to_string()).into())
//! }
//!
//! assert!(may_fail().is_err());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Top-level error type for the routing layer.
///
/// All sub-error types convert into `RouterError` via `From`:
///
/// ```rust
/// use mcp_router::error::{RouterError, RegistryError};
///
/// let error: RouterError = RegistryError::NotFound("tool:echo".to_string()).into();
/// assert!(error.to_string().contains("tool:echo"));
/// ```
#[derive(Debug, Error)]
pub enum RouterError {
    /// Local registry error (duplicates, missing keys).
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Tool lookup or execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Resource lookup or read error.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Prompt lookup or render error.
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// Invalid transformation request.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Schema merge or dereference failure.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Every provider failed to answer.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Visibility rule error.
    #[error("Visibility error: {0}")]
    Visibility(#[from] VisibilityError),

    /// Router configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Local registry errors.
///
/// # Examples
///
/// ```rust
/// use mcp_router::error::RegistryError;
///
/// let error = RegistryError::Duplicate("tool:greet".to_string());
/// assert_eq!(error.to_string(), "Component already registered: tool:greet");
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A component with the same key is already stored and the duplicate
    /// policy is `error`.
    #[error("Component already registered: {0}")]
    Duplicate(String),

    /// No component is stored under the key.
    #[error("Component not found: {0}")]
    NotFound(String),

    /// The key string could not be parsed.
    #[error("Invalid component key: {0}")]
    InvalidKey(String),
}

/// Tool-specific errors.
///
/// # Examples
///
/// ```rust
/// use mcp_router::error::ToolError;
/// use std::time::Duration;
///
/// let error = ToolError::NotFound("nonexistent_tool".to_string());
/// let error = ToolError::Timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Error)]
pub enum ToolError {
    /// No provider exposes an enabled tool with this name.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments could not be decoded into the handler's input type.
    #[error("Invalid tool input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    /// Arguments were structurally wrong (missing or mistyped).
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Arguments that the tool does not declare were supplied.
    #[error("Got unexpected keyword argument(s): {}", .0.join(", "))]
    UnexpectedArguments(Vec<String>),

    /// Tool execution failed.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool execution exceeded its time limit.
    #[error("Tool execution timeout after {0:?}")]
    Timeout(Duration),

    /// The upstream that owns this tool failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    /// Catch-all for unexpected errors during tool execution.
    #[error("Internal tool error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Resource-specific errors.
///
/// # Examples
///
/// ```rust
/// use mcp_router::error::ResourceError;
///
/// let error = ResourceError::NotFound("app://config".to_string());
/// let error = ResourceError::InvalidUri("not a valid URI".to_string());
/// ```
#[derive(Debug, Error)]
pub enum ResourceError {
    /// No provider exposes an enabled resource or template matching the URI.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The URI or URI template is malformed.
    #[error("Invalid resource URI: {0}")]
    InvalidUri(String),

    /// Content could not be produced.
    #[error("Failed to read resource: {0}")]
    ReadFailed(String),

    /// The upstream that owns this resource failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    /// Catch-all for unexpected errors during resource reads.
    #[error("Internal resource error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Prompt-specific errors.
#[derive(Debug, Error)]
pub enum PromptError {
    /// No provider exposes an enabled prompt with this name.
    #[error("Prompt not found: {0}")]
    NotFound(String),

    /// A required prompt argument was not supplied.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Rendering failed.
    #[error("Failed to render prompt: {0}")]
    RenderFailed(String),

    /// The upstream that owns this prompt failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    /// Catch-all for unexpected errors during rendering.
    #[error("Internal prompt error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Invalid transformation requests.
///
/// These are raised when a transform is configured, before any call can
/// reach the transformed component.
///
/// # Examples
///
/// ```rust
/// use mcp_router::error::TransformError;
///
/// let error = TransformError::HiddenWithoutDefault("required_param".to_string());
/// assert!(error.to_string().contains("has no default value"));
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The transform names arguments the parent tool does not have.
    #[error("Unknown arguments in transform_args: {} (tool `{tool}`)", .names.join(", "))]
    UnknownArguments {
        /// Parent tool name
        tool: String,
        /// Offending argument names, sorted
        names: Vec<String>,
    },

    /// Two arguments would be exposed under the same name.
    #[error("Multiple arguments would be mapped to the same names: {}", .0.join(", "))]
    DuplicateArgumentNames(Vec<String>),

    /// A required argument was hidden without a replacement default.
    #[error("Hidden parameter '{0}' has no default value in parent tool")]
    HiddenWithoutDefault(String),

    /// Both `default` and `default_factory` were set.
    #[error("Argument '{0}' cannot specify both default and default_factory")]
    ConflictingDefaults(String),

    /// `default_factory` is only allowed on hidden arguments.
    #[error("Argument '{0}' uses default_factory but is not hidden")]
    FactoryRequiresHide(String),

    /// An argument cannot be both hidden and required.
    #[error("Argument '{0}' cannot be both hidden and required")]
    HiddenRequired(String),

    /// An argument cannot be required and carry a default.
    #[error("Argument '{0}' cannot be required and have a default")]
    RequiredWithDefault(String),

    /// A custom function without pass-through arguments omits parameters the
    /// transformed tool exposes.
    #[error("Function missing parameters required after transformation: {}", .0.join(", "))]
    MissingFunctionParameters(Vec<String>),

    /// An explicit output schema must describe an object.
    #[error("Output schema must be an object schema: {0}")]
    InvalidOutputSchema(String),

    /// Two tools were given the same override name.
    #[error("Duplicate tool name override: {0}")]
    DuplicateNameOverride(String),

    /// URI template parameters and handler parameters disagree.
    #[error("URI template parameter mismatch: {0}")]
    TemplateParameterMismatch(String),

    /// The merged schema could not be produced.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Schema engine errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A local `$ref` points at a definition that does not exist.
    #[error("Unresolvable reference: {0}")]
    UnresolvableReference(String),

    /// The schema does not have the expected shape.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// Provider errors, caught at the router boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("Provider '{provider}' unreachable: {reason}")]
    Unreachable {
        /// Provider label
        provider: String,
        /// Failure description
        reason: String,
    },

    /// The provider did not answer within the configured timeout.
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream returned an error.
    #[error("Upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Session delivery errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is closed.
    #[error("Session closed")]
    Closed,

    /// Delivery failed.
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
}

/// Visibility rule errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VisibilityError {
    /// A session-scoped rule was requested outside of a session.
    #[error("No active session: session-scoped visibility requires a session")]
    NoSession,
}

impl From<RegistryError> for ToolError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(key) => ToolError::NotFound(key),
            other => ToolError::Internal(anyhow::anyhow!(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_error_from_tool_error() {
        let error: RouterError = ToolError::NotFound("echo".to_string()).into();
        assert!(matches!(error, RouterError::Tool(ToolError::NotFound(_))));
        assert_eq!(error.to_string(), "Tool error: Tool not found: echo");
    }

    #[test]
    fn test_unexpected_arguments_message() {
        let error = ToolError::UnexpectedArguments(vec!["old_x".into(), "old_y".into()]);
        assert_eq!(
            error.to_string(),
            "Got unexpected keyword argument(s): old_x, old_y"
        );
    }

    #[test]
    fn test_unknown_arguments_names_tool() {
        let error = TransformError::UnknownArguments {
            tool: "add".to_string(),
            names: vec!["unknown_param".to_string()],
        };
        let message = error.to_string();
        assert!(message.contains("Unknown arguments in transform_args: unknown_param"));
        assert!(message.contains("`add`"));
    }

    #[test]
    fn test_transform_error_from_schema_error() {
        let error: TransformError =
            SchemaError::UnresolvableReference("#/$defs/Missing".into()).into();
        assert_eq!(error.to_string(), "Unresolvable reference: #/$defs/Missing");
    }

    #[test]
    fn test_registry_error_into_tool_error() {
        let error: ToolError = RegistryError::NotFound("tool:echo".into()).into();
        assert!(matches!(error, ToolError::NotFound(ref k) if k == "tool:echo"));

        let error: ToolError = RegistryError::Duplicate("tool:echo".into()).into();
        assert!(matches!(error, ToolError::Internal(_)));
    }

    #[test]
    fn test_provider_error_display() {
        let error = ProviderError::Unreachable {
            provider: "weather".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            error.to_string(),
            "Provider 'weather' unreachable: connection refused"
        );
    }
}
