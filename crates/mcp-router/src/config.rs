//! Router configuration.
//!
//! [`RouterConfig`] holds the settings a host can tune: the router name, the
//! duplicate-registration policy of the local registry, the per-provider
//! timeout applied while aggregating, and the default log filter.
//!
//! It deserializes from any serde format so hosts can embed it in their own
//! configuration files:
//!
//! ```
//! use mcp_router::config::{DuplicatePolicy, RouterConfig};
//! use std::time::Duration;
//!
//! let config: RouterConfig = serde_json::from_str(
//!     r#"{"name": "gateway", "on_duplicate": "replace", "provider_timeout_ms": 500}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.name(), "gateway");
//! assert_eq!(config.on_duplicate(), DuplicatePolicy::Replace);
//! assert_eq!(config.provider_timeout(), Some(Duration::from_millis(500)));
//! assert_eq!(config.log_filter(), "info");
//! ```

use crate::error::RouterError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// What the local registry does when a key is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Reject the second registration
    #[default]
    Error,
    /// Log a warning and replace
    Warn,
    /// Replace silently
    Replace,
    /// Keep the stored component and return it
    Ignore,
}

impl DuplicatePolicy {
    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Error => "error",
            DuplicatePolicy::Warn => "warn",
            DuplicatePolicy::Replace => "replace",
            DuplicatePolicy::Ignore => "ignore",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(DuplicatePolicy::Error),
            "warn" => Ok(DuplicatePolicy::Warn),
            "replace" => Ok(DuplicatePolicy::Replace),
            "ignore" => Ok(DuplicatePolicy::Ignore),
            other => Err(RouterError::Config(format!(
                "invalid duplicate policy '{}': expected one of error, warn, replace, ignore",
                other
            ))),
        }
    }
}

/// Router configuration.
///
/// # Examples
///
/// ```
/// use mcp_router::config::{DuplicatePolicy, RouterConfig};
///
/// let config = RouterConfig::new("my-router");
/// assert_eq!(config.name(), "my-router");
/// assert_eq!(config.on_duplicate(), DuplicatePolicy::Error);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub(crate) name: String,
    pub(crate) on_duplicate: DuplicatePolicy,
    #[serde(
        rename = "provider_timeout_ms",
        serialize_with = "serialize_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub(crate) provider_timeout: Option<Duration>,
    pub(crate) log_filter: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "mcp-router".to_string(),
            on_duplicate: DuplicatePolicy::default(),
            provider_timeout: Some(DEFAULT_PROVIDER_TIMEOUT),
            log_filter: "info".to_string(),
        }
    }
}

impl RouterConfig {
    /// Creates a configuration with default settings and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates a builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::config::{DuplicatePolicy, RouterConfig};
    /// use std::time::Duration;
    ///
    /// let config = RouterConfig::builder()
    ///     .name("gateway")
    ///     .on_duplicate(DuplicatePolicy::Warn)
    ///     .provider_timeout(Duration::from_secs(5))
    ///     .build();
    ///
    /// assert_eq!(config.provider_timeout(), Some(Duration::from_secs(5)));
    /// ```
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Returns the router name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the duplicate policy of the local registry.
    pub fn on_duplicate(&self) -> DuplicatePolicy {
        self.on_duplicate
    }

    /// Returns the per-provider timeout, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::config::RouterConfig;
    ///
    /// let config = RouterConfig::builder().no_provider_timeout().build();
    /// assert!(config.provider_timeout().is_none());
    /// ```
    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout
    }

    /// Returns the default log filter used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }
}

/// Builder for [`RouterConfig`].
#[derive(Debug, Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    /// Sets the router name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the duplicate policy.
    pub fn on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.config.on_duplicate = policy;
        self
    }

    /// Sets the per-provider timeout.
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.config.provider_timeout = Some(timeout);
        self
    }

    /// Disables the per-provider timeout.
    pub fn no_provider_timeout(mut self) -> Self {
        self.config.provider_timeout = None;
        self
    }

    /// Sets the default log filter.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RouterConfig {
        self.config
    }
}

fn serialize_timeout<S: Serializer>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_some(&(timeout.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    let millis: Option<u64> = Option::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.name(), "mcp-router");
        assert_eq!(config.on_duplicate(), DuplicatePolicy::Error);
        assert_eq!(config.provider_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("warn".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Warn);
        assert_eq!(" Ignore ".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Ignore);
        let error = "skip".parse::<DuplicatePolicy>().unwrap_err();
        assert!(error.to_string().contains("invalid duplicate policy 'skip'"));
    }

    #[test]
    fn test_policy_serde() {
        let policy: DuplicatePolicy = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(policy, DuplicatePolicy::Replace);
        assert_eq!(serde_json::to_string(&DuplicatePolicy::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: RouterConfig = serde_json::from_str(r#"{"on_duplicate": "ignore"}"#).unwrap();
        assert_eq!(config.name(), "mcp-router");
        assert_eq!(config.on_duplicate(), DuplicatePolicy::Ignore);
        assert_eq!(config.provider_timeout(), Some(DEFAULT_PROVIDER_TIMEOUT));
    }

    #[test]
    fn test_null_timeout_disables() {
        let config: RouterConfig = serde_json::from_str(r#"{"provider_timeout_ms": null}"#).unwrap();
        assert!(config.provider_timeout().is_none());
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = RouterConfig::builder()
            .name("gw")
            .provider_timeout(Duration::from_millis(250))
            .log_filter("debug")
            .build();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["provider_timeout_ms"], 250);
        let back: RouterConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
