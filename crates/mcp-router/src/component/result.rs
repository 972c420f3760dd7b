//! Tool result types.
//!
//! Handlers return a [`ToolOutput`]: either a raw JSON value, which the tool
//! converts into a [`ToolResult`] according to its output schema, or a
//! finished `ToolResult` that passes through untouched.

use crate::transform::schema::is_wrapped_output;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result of a tool execution.
///
/// # Examples
///
/// ```
/// use mcp_router::component::{ToolResult, Content};
///
/// let result = ToolResult::success_text("Operation completed");
/// assert!(!result.is_error());
///
/// let result = ToolResult::error("Something went wrong");
/// assert!(result.is_error());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Unstructured content blocks
    pub content: Vec<Content>,

    /// Structured content, present when the tool declares an output schema
    /// or returns an object
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "structuredContent"
    )]
    pub structured_content: Option<Value>,

    /// Whether this result represents an error
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "isError")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    /// Creates a successful result with the given content.
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            structured_content: None,
            is_error: None,
        }
    }

    /// Creates a successful result with a single text content.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::ToolResult;
    ///
    /// let result = ToolResult::success_text("done");
    /// assert_eq!(result.first_text(), Some("done"));
    /// ```
    pub fn success_text(text: impl Into<String>) -> Self {
        Self::success(vec![Content::text(text)])
    }

    /// Creates an error result with a single text message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            structured_content: None,
            is_error: Some(true),
        }
    }

    /// Builds a result from a raw handler return value.
    ///
    /// The text content is the value itself for strings and its JSON
    /// rendering otherwise. Structured content is `{"result": value}` when the
    /// output schema carries the wrap marker, the value itself when it is an
    /// object, and absent otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::ToolResult;
    /// use mcp_router::transform::wrap_output_schema;
    /// use serde_json::json;
    ///
    /// let schema = wrap_output_schema(json!({"type": "integer"}));
    /// let result = ToolResult::from_value(json!(13), Some(&schema));
    /// assert_eq!(result.first_text(), Some("13"));
    /// assert_eq!(result.structured_content, Some(json!({"result": 13})));
    /// ```
    pub fn from_value(value: Value, output_schema: Option<&Value>) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let content = if value.is_null() {
            Vec::new()
        } else {
            vec![Content::text(text)]
        };

        let structured_content = match output_schema {
            Some(schema) if is_wrapped_output(schema) => Some(json!({ "result": value })),
            _ if value.is_object() => Some(value),
            _ => None,
        };

        Self {
            content,
            structured_content,
            is_error: None,
        }
    }

    /// Attaches structured content.
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    /// Returns whether this result represents an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// Returns the text of the first content block, if it is text.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(Content::as_text)
    }
}

/// Content block shared by tool results and prompt messages.
///
/// # Examples
///
/// ```
/// use mcp_router::component::Content;
///
/// let text = Content::text("Hello, world!");
/// let image = Content::image("base64data", "image/png");
/// let resource = Content::resource("file:///path/to/file.txt");
/// assert_eq!(text.as_text(), Some("Hello, world!"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text content
    Text {
        /// The text content
        text: String,
    },
    /// Image content
    Image {
        /// Base64-encoded image data
        data: String,
        /// MIME type of the image
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Resource reference
    Resource {
        /// URI of the resource
        uri: String,
    },
}

impl Content {
    /// Creates text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates image content.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Creates a resource reference.
    pub fn resource(uri: impl Into<String>) -> Self {
        Self::Resource { uri: uri.into() }
    }

    /// Returns the text if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// What a tool handler hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// A raw return value, converted with [`ToolResult::from_value`]
    Value(Value),
    /// A finished result, passed through as is
    Result(ToolResult),
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Value(value)
    }
}

impl From<ToolResult> for ToolOutput {
    fn from(result: ToolResult) -> Self {
        ToolOutput::Result(result)
    }
}

impl ToolOutput {
    /// Finalizes the output against an output schema.
    pub fn into_result(self, output_schema: Option<&Value>) -> ToolResult {
        match self {
            ToolOutput::Value(value) => ToolResult::from_value(value, output_schema),
            ToolOutput::Result(result) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::wrap_output_schema;

    #[test]
    fn test_tool_result_success_text() {
        let result = ToolResult::success_text("Operation completed");
        assert!(!result.is_error());
        assert_eq!(result.first_text(), Some("Operation completed"));
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("Something went wrong");
        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("Something went wrong"));
    }

    #[test]
    fn test_from_value_string_is_verbatim() {
        let result = ToolResult::from_value(json!("hello"), None);
        assert_eq!(result.first_text(), Some("hello"));
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_from_value_object_is_structured() {
        let result = ToolResult::from_value(json!({"a": 1}), None);
        assert_eq!(result.structured_content, Some(json!({"a": 1})));
        assert_eq!(result.first_text(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_from_value_wraps_with_marker() {
        let schema = wrap_output_schema(json!({"type": "array", "items": {"type": "integer"}}));
        let result = ToolResult::from_value(json!([1, 2]), Some(&schema));
        assert_eq!(result.structured_content, Some(json!({"result": [1, 2]})));
    }

    #[test]
    fn test_from_value_null_has_no_content() {
        let result = ToolResult::from_value(Value::Null, None);
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_output_passthrough() {
        let finished = ToolResult::success_text("x").with_structured(json!({"result": 1}));
        let output = ToolOutput::from(finished.clone());
        let schema = wrap_output_schema(json!({"type": "string"}));
        assert_eq!(output.into_result(Some(&schema)), finished);
    }

    #[test]
    fn test_tool_result_serialization() {
        let result = ToolResult::from_value(json!({"ok": true}), None);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["content"].is_array());
        assert_eq!(json["structuredContent"], json!({"ok": true}));
        assert!(json.get("isError").is_none());

        let json = serde_json::to_value(ToolResult::error("Failed")).unwrap();
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn test_content_serialization() {
        let image = Content::image("data", "image/png");
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["mimeType"], "image/png");
    }
}
