//! # MCP Router
//!
//! Component routing, composition and tool transformation for MCP (Model
//! Context Protocol) servers.
//!
//! A [`Router`] exposes tools, resources, resource templates and prompts
//! gathered from an ordered list of [`Provider`]s: its own
//! [`LocalRegistry`], other routers mounted under a prefix, proxies to
//! remote servers and filesystem-backed skills.
//!
//! ## Quick Start
//!
//! ```rust
//! use mcp_router::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let weather = Router::new("weather");
//! weather
//!     .add_tool(Tool::from_fn("forecast", json!({"type": "object"}), |_| async {
//!         Ok(json!("sunny"))
//!     }))
//!     .unwrap();
//!
//! let gateway = Router::new("gateway");
//! gateway.mount(weather, Some("weather")).await;
//!
//! let result = gateway.call_tool("weather_forecast", Arguments::new()).await.unwrap();
//! assert_eq!(result.first_text(), Some("sunny"));
//! # });
//! ```
//!
//! ## Modules
//!
//! - [`component`]: Component types, keys and versions
//! - [`registry`]: Keyed local storage with a duplicate policy
//! - [`provider`]: The provider contract plus mount, proxy and skills providers
//! - [`router`]: Provider composition, lookup and visibility
//! - [`transform`]: Tool argument transformation and JSON Schema utilities
//! - [`visibility`]: Enable/disable rules
//! - [`notify`]: List-changed notifications
//! - [`context`]: Request-scoped call context
//! - [`config`]: Router configuration
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error types and conversions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::result_large_err)]

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod notify;
pub mod prelude;
pub mod provider;
pub mod registry;
pub mod router;
pub mod transform;
pub mod visibility;

// Re-export commonly used types at crate root
pub use component::{Component, ComponentKind, Key, Prompt, Resource, ResourceTemplate, Tool, ToolResult};
pub use config::{DuplicatePolicy, RouterConfig};
pub use error::{RouterError, Result};
pub use provider::Provider;
pub use registry::LocalRegistry;
pub use router::Router;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
