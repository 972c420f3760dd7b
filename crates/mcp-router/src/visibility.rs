//! Visibility rules.
//!
//! Components are enabled or disabled by appending [`VisibilityRule`]s.
//! Rules are never edited in place: for a given component the **last**
//! matching rule decides, and a component no rule matches is enabled.
//!
//! Rules live in two streams. Global rules apply to every caller; session
//! rules apply to one session and are layered after the global ones, so a
//! session can re-enable what is globally disabled. Sessions never see each
//! other's rules.
//!
//! # Examples
//!
//! ```
//! use mcp_router::component::{Component, Tool};
//! use mcp_router::visibility::{RuleMatch, VisibilityRule, VisibilityStore};
//! use serde_json::json;
//!
//! let tool = Tool::from_fn("delete_all", json!({"type": "object"}), |_args| async move {
//!     Ok(json!(null))
//! })
//! .with_tag("dangerous");
//!
//! let store = VisibilityStore::new();
//! store.add_global(VisibilityRule::disable(RuleMatch::tags(["dangerous"])));
//! store.add_session("admin", VisibilityRule::enable(RuleMatch::names(["delete_all"])));
//!
//! assert!(!store.rules_for(None).is_enabled(&tool));
//! assert!(store.rules_for(Some("admin")).is_enabled(&tool));
//! assert!(!store.rules_for(Some("guest")).is_enabled(&tool));
//! ```

use crate::component::{Component, ComponentKind, Key, VersionSpec};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which components a rule applies to.
///
/// Every criterion that is set must hold. A matcher with no criteria matches
/// nothing; `match_all` matches everything, still restricted by
/// `components`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Component names; resource URIs and template URI templates also count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<BTreeSet<String>>,

    /// Exact keys; an unversioned key covers every version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Key>>,

    /// Tags; any overlap matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,

    /// Version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionSpec>,

    /// Component kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeSet<ComponentKind>>,

    /// Match every component
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub match_all: bool,
}

impl RuleMatch {
    /// Matches components by name.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Matches components by key.
    pub fn keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: Some(keys.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Matches components carrying any of the tags.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Matches components by version.
    pub fn version(spec: VersionSpec) -> Self {
        Self {
            version: Some(spec),
            ..Self::default()
        }
    }

    /// Matches every component.
    pub fn all() -> Self {
        Self {
            match_all: true,
            ..Self::default()
        }
    }

    /// Restricts the matcher to the given kinds.
    pub fn only(mut self, kinds: impl IntoIterator<Item = ComponentKind>) -> Self {
        self.components = Some(kinds.into_iter().collect());
        self
    }

    /// Adds a version constraint.
    pub fn with_version(mut self, spec: VersionSpec) -> Self {
        self.version = Some(spec);
        self
    }

    /// Adds a tag criterion.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    fn has_criteria(&self) -> bool {
        self.names.is_some()
            || self.keys.is_some()
            || self.tags.is_some()
            || self.version.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Tests a component.
    pub fn matches<C: Component + ?Sized>(&self, component: &C) -> bool {
        if !self.match_all && !self.has_criteria() {
            return false;
        }
        if let Some(kinds) = &self.components {
            if !kinds.contains(&component.kind()) {
                return false;
            }
        }
        if let Some(names) = &self.names {
            if !names.contains(component.name()) && !names.contains(component.identifier()) {
                return false;
            }
        }
        if let Some(keys) = &self.keys {
            let key = component.key();
            if !keys.iter().any(|k| k.covers(&key)) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if tags.is_disjoint(component.tags()) {
                return false;
            }
        }
        if let Some(spec) = &self.version {
            if !spec.matches(component.version()) {
                return false;
            }
        }
        true
    }
}

/// An enable or disable mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityRule {
    /// Outcome for matching components
    pub enabled: bool,

    /// Match criteria
    #[serde(flatten)]
    pub matcher: RuleMatch,
}

impl VisibilityRule {
    /// Creates an enabling rule.
    pub fn enable(matcher: RuleMatch) -> Self {
        Self { enabled: true, matcher }
    }

    /// Creates a disabling rule.
    pub fn disable(matcher: RuleMatch) -> Self {
        Self {
            enabled: false,
            matcher,
        }
    }
}

/// A snapshot of the rules that apply to one caller.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<VisibilityRule>,
}

impl RuleSet {
    /// Creates a rule set from rules in evaluation order.
    pub fn new(rules: Vec<VisibilityRule>) -> Self {
        Self { rules }
    }

    /// Returns the rules in evaluation order.
    pub fn rules(&self) -> &[VisibilityRule] {
        &self.rules
    }

    /// Returns the rule set with one more rule appended.
    pub fn with_rule(mut self, rule: VisibilityRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns whether the component is enabled: the last matching rule
    /// decides, and no match means enabled.
    pub fn is_enabled<C: Component + ?Sized>(&self, component: &C) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.matches(component))
            .map_or(true, |rule| rule.enabled)
    }
}

/// Rule storage owned by one router.
#[derive(Debug, Default)]
pub struct VisibilityStore {
    global: RwLock<Vec<VisibilityRule>>,
    sessions: DashMap<String, Vec<VisibilityRule>>,
}

impl VisibilityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a global rule.
    pub fn add_global(&self, rule: VisibilityRule) {
        self.global.write().push(rule);
    }

    /// Appends a rule for one session.
    pub fn add_session(&self, session_id: &str, rule: VisibilityRule) {
        self.sessions.entry(session_id.to_string()).or_default().push(rule);
    }

    /// Removes every global rule, returning how many there were.
    pub fn reset_global(&self) -> usize {
        std::mem::take(&mut *self.global.write()).len()
    }

    /// Removes every rule of one session, returning how many there were.
    pub fn reset_session(&self, session_id: &str) -> usize {
        self.sessions.remove(session_id).map_or(0, |(_, rules)| rules.len())
    }

    /// Returns the global rules.
    pub fn global_rules(&self) -> Vec<VisibilityRule> {
        self.global.read().clone()
    }

    /// Returns the rules of one session.
    pub fn session_rules(&self, session_id: &str) -> Vec<VisibilityRule> {
        self.sessions
            .get(session_id)
            .map(|rules| rules.value().clone())
            .unwrap_or_default()
    }

    /// Returns how many sessions hold rules.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshots the rules for a caller: global rules, then the session's.
    pub fn rules_for(&self, session_id: Option<&str>) -> RuleSet {
        let mut rules = self.global_rules();
        if let Some(id) = session_id {
            if let Some(session) = self.sessions.get(id) {
                rules.extend(session.iter().cloned());
            }
        }
        RuleSet::new(rules)
    }
}
