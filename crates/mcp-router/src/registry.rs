//! In-process component storage.
//!
//! [`LocalRegistry`] is the authoritative store for one namespace of
//! components. Each kind lives in its own concurrent map keyed by [`Key`];
//! listings come back in insertion order. Re-registering a key is governed
//! by the registry's [`DuplicatePolicy`].
//!
//! The registry also holds the transform overlay: [`ToolTransform`] records
//! keyed by the original tool name and applied whenever tools are read. The
//! stored tools are never modified.
//!
//! Every successful mutation sends a list-changed notification for the
//! affected kind to the current session (see [`crate::notify`]).

use crate::component::{
    highest_version, AnyComponent, Component, ComponentKind, Key, Prompt, Resource, ResourceTemplate, Tool,
};
use crate::config::DuplicatePolicy;
use crate::error::{ProviderError, RegistryError, RouterError, TransformError};
use crate::notify;
use crate::provider::mount::{prefix_prompt, prefix_resource, prefix_template, prefix_tool};
use crate::provider::Provider;
use crate::transform::ToolTransform;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
struct Slot<T> {
    seq: u64,
    component: T,
}

/// Thread-safe store of tools, resources, templates and prompts.
///
/// Cloning is cheap and shares the underlying storage.
///
/// # Examples
///
/// ## Basic Usage
///
/// ```
/// use mcp_router::component::{Component, Key, Tool};
/// use mcp_router::registry::LocalRegistry;
/// use serde_json::json;
///
/// let registry = LocalRegistry::new();
/// registry
///     .add_tool(Tool::from_fn("greet", json!({"type": "object"}), |_| async {
///         Ok(json!("hello"))
///     }))
///     .unwrap();
///
/// assert!(registry.get(&Key::tool("greet")).is_some());
/// assert_eq!(registry.len(), 1);
/// ```
///
/// ## Duplicate Detection
///
/// ```
/// use mcp_router::component::Tool;
/// use mcp_router::registry::LocalRegistry;
/// use serde_json::json;
///
/// let registry = LocalRegistry::new();
/// let tool = Tool::from_fn("greet", json!({"type": "object"}), |_| async { Ok(json!(1)) });
///
/// registry.add_tool(tool.clone()).unwrap();
/// assert!(registry.add_tool(tool).is_err());
/// ```
#[derive(Clone)]
pub struct LocalRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    policy: DuplicatePolicy,
    next_seq: AtomicU64,
    tools: DashMap<Key, Slot<Tool>>,
    resources: DashMap<Key, Slot<Resource>>,
    templates: DashMap<Key, Slot<ResourceTemplate>>,
    prompts: DashMap<Key, Slot<Prompt>>,
    transforms: DashMap<String, ToolTransform>,
}

impl fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("policy", &self.inner.policy)
            .field("tools", &self.inner.tools.len())
            .field("resources", &self.inner.resources.len())
            .field("templates", &self.inner.templates.len())
            .field("prompts", &self.inner.prompts.len())
            .field("transforms", &self.inner.transforms.len())
            .finish()
    }
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRegistry {
    /// Creates an empty registry that rejects duplicates.
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::Error)
    }

    /// Creates an empty registry with the given duplicate policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::{Component, Key, Tool};
    /// use mcp_router::config::DuplicatePolicy;
    /// use mcp_router::registry::LocalRegistry;
    /// use serde_json::json;
    ///
    /// let registry = LocalRegistry::with_policy(DuplicatePolicy::Ignore);
    /// let first = Tool::from_fn("greet", json!({"type": "object"}), |_| async { Ok(json!(1)) })
    ///     .with_description("first");
    /// let second = first.clone().with_description("second");
    ///
    /// registry.add_tool(first).unwrap();
    /// let kept = registry.add_tool(second).unwrap();
    /// assert_eq!(kept.meta().description.as_deref(), Some("first"));
    /// ```
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                policy,
                next_seq: AtomicU64::new(0),
                tools: DashMap::new(),
                resources: DashMap::new(),
                templates: DashMap::new(),
                prompts: DashMap::new(),
                transforms: DashMap::new(),
            }),
        }
    }

    /// Returns the duplicate policy.
    pub fn policy(&self) -> DuplicatePolicy {
        self.inner.policy
    }

    /// Registers a tool.
    ///
    /// Returns the stored tool: the argument, or the existing tool when the
    /// policy is `ignore`.
    ///
    /// # Errors
    ///
    /// `RegistryError::Duplicate` when the key is taken and the policy is
    /// `error`. The stored tool is left unchanged.
    pub fn add_tool(&self, tool: Tool) -> Result<Tool, RegistryError> {
        let (stored, changed) = self.store(&self.inner.tools, tool, self.inner.policy)?;
        if changed {
            notify::dispatch([ComponentKind::Tool]);
        }
        Ok(stored)
    }

    /// Registers a resource. See [`add_tool`](Self::add_tool).
    pub fn add_resource(&self, resource: Resource) -> Result<Resource, RegistryError> {
        let (stored, changed) = self.store(&self.inner.resources, resource, self.inner.policy)?;
        if changed {
            notify::dispatch([ComponentKind::Resource]);
        }
        Ok(stored)
    }

    /// Registers a resource template. See [`add_tool`](Self::add_tool).
    pub fn add_template(&self, template: ResourceTemplate) -> Result<ResourceTemplate, RegistryError> {
        let (stored, changed) = self.store(&self.inner.templates, template, self.inner.policy)?;
        if changed {
            notify::dispatch([ComponentKind::Template]);
        }
        Ok(stored)
    }

    /// Registers a prompt. See [`add_tool`](Self::add_tool).
    pub fn add_prompt(&self, prompt: Prompt) -> Result<Prompt, RegistryError> {
        let (stored, changed) = self.store(&self.inner.prompts, prompt, self.inner.policy)?;
        if changed {
            notify::dispatch([ComponentKind::Prompt]);
        }
        Ok(stored)
    }

    /// Registers a component of any kind.
    pub fn add(&self, component: AnyComponent) -> Result<AnyComponent, RegistryError> {
        Ok(match component {
            AnyComponent::Tool(tool) => self.add_tool(tool)?.into(),
            AnyComponent::Resource(resource) => self.add_resource(resource)?.into(),
            AnyComponent::Template(template) => self.add_template(template)?.into(),
            AnyComponent::Prompt(prompt) => self.add_prompt(prompt)?.into(),
        })
    }

    /// Removes the component stored under `key`.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if nothing is stored under the key.
    pub fn remove(&self, key: &Key) -> Result<AnyComponent, RegistryError> {
        let removed: Option<AnyComponent> = match key.kind() {
            ComponentKind::Tool => self.inner.tools.remove(key).map(|(_, slot)| slot.component.into()),
            ComponentKind::Resource => self.inner.resources.remove(key).map(|(_, slot)| slot.component.into()),
            ComponentKind::Template => self.inner.templates.remove(key).map(|(_, slot)| slot.component.into()),
            ComponentKind::Prompt => self.inner.prompts.remove(key).map(|(_, slot)| slot.component.into()),
        };
        let removed = removed.ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        notify::dispatch([key.kind()]);
        Ok(removed)
    }

    /// Removes every version of the tool called `name`.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if no tool has that name.
    pub fn remove_tool(&self, name: &str) -> Result<usize, RegistryError> {
        let removed = remove_named(&self.inner.tools, name);
        if removed == 0 {
            return Err(RegistryError::NotFound(Key::tool(name).to_string()));
        }
        notify::dispatch([ComponentKind::Tool]);
        Ok(removed)
    }

    /// Removes every version of the prompt called `name`.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if no prompt has that name.
    pub fn remove_prompt(&self, name: &str) -> Result<usize, RegistryError> {
        let removed = remove_named(&self.inner.prompts, name);
        if removed == 0 {
            return Err(RegistryError::NotFound(Key::prompt(name).to_string()));
        }
        notify::dispatch([ComponentKind::Prompt]);
        Ok(removed)
    }

    /// Returns the stored component for `key`, without transforms.
    pub fn get(&self, key: &Key) -> Option<AnyComponent> {
        match key.kind() {
            ComponentKind::Tool => self.inner.tools.get(key).map(|slot| slot.component.clone().into()),
            ComponentKind::Resource => self.inner.resources.get(key).map(|slot| slot.component.clone().into()),
            ComponentKind::Template => self.inner.templates.get(key).map(|slot| slot.component.clone().into()),
            ComponentKind::Prompt => self.inner.prompts.get(key).map(|slot| slot.component.clone().into()),
        }
    }

    /// Returns `true` if something is stored under `key`.
    pub fn contains(&self, key: &Key) -> bool {
        match key.kind() {
            ComponentKind::Tool => self.inner.tools.contains_key(key),
            ComponentKind::Resource => self.inner.resources.contains_key(key),
            ComponentKind::Template => self.inner.templates.contains_key(key),
            ComponentKind::Prompt => self.inner.prompts.contains_key(key),
        }
    }

    /// Lists stored components of one kind in insertion order, without
    /// transforms.
    pub fn list(&self, kind: ComponentKind) -> Vec<AnyComponent> {
        match kind {
            ComponentKind::Tool => ordered(&self.inner.tools).into_iter().map(Into::into).collect(),
            ComponentKind::Resource => ordered(&self.inner.resources).into_iter().map(Into::into).collect(),
            ComponentKind::Template => ordered(&self.inner.templates).into_iter().map(Into::into).collect(),
            ComponentKind::Prompt => ordered(&self.inner.prompts).into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the number of stored components across all kinds.
    pub fn len(&self) -> usize {
        self.inner.tools.len() + self.inner.resources.len() + self.inner.templates.len() + self.inner.prompts.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a transform for the tool originally called `tool_name`.
    ///
    /// The record is validated now: every argument rewrite is checked, and
    /// if the tool is already stored the transformation is built once so a
    /// bad record is rejected before any call can reach it.
    ///
    /// # Errors
    ///
    /// Any `TransformError` the record would produce.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_router::component::Tool;
    /// use mcp_router::provider::Provider;
    /// use mcp_router::registry::LocalRegistry;
    /// use mcp_router::transform::ToolTransform;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let registry = LocalRegistry::new();
    /// registry
    ///     .add_tool(Tool::from_fn("search", json!({"type": "object"}), |_| async { Ok(json!([])) }))
    ///     .unwrap();
    /// registry
    ///     .add_transform("search", ToolTransform::new().with_name("find"))
    ///     .unwrap();
    ///
    /// assert!(registry.get_tool("find").await.unwrap().is_some());
    /// assert!(registry.get_tool("search").await.unwrap().is_none());
    /// # });
    /// ```
    pub fn add_transform(&self, tool_name: impl Into<String>, transform: ToolTransform) -> Result<(), TransformError> {
        let tool_name = tool_name.into();
        for (argument, rewrite) in &transform.arguments {
            rewrite.validate(argument)?;
        }
        for tool in self.stored_tools_named(&tool_name) {
            transform.apply(&tool)?;
        }
        self.inner.transforms.insert(tool_name, transform);
        notify::dispatch([ComponentKind::Tool]);
        Ok(())
    }

    /// Returns the transform registered for `tool_name`.
    pub fn get_transform(&self, tool_name: &str) -> Option<ToolTransform> {
        self.inner.transforms.get(tool_name).map(|t| t.value().clone())
    }

    /// Removes the transform registered for `tool_name`.
    pub fn remove_transform(&self, tool_name: &str) -> Option<ToolTransform> {
        let removed = self.inner.transforms.remove(tool_name).map(|(_, t)| t);
        if removed.is_some() {
            notify::dispatch([ComponentKind::Tool]);
        }
        removed
    }

    /// Copies every component of `provider` into this registry, renamed
    /// under `prefix`.
    ///
    /// This is a snapshot: later changes in `provider` are not seen. An
    /// imported component replaces whatever is stored under the same key,
    /// regardless of the duplicate policy. At most one notification per
    /// kind is sent.
    ///
    /// # Errors
    ///
    /// The provider's error if any listing fails, or an invalid prefixed URI
    /// template. Nothing is imported in either case.
    pub async fn import_from<P: Provider + ?Sized>(&self, provider: &P, prefix: Option<&str>) -> Result<usize, RouterError> {
        let prefix = prefix.filter(|p| !p.is_empty());
        let tools = provider.list_tools().await?;
        let resources = provider.list_resources().await?;
        let templates = provider.list_resource_templates().await?;
        let prompts = provider.list_prompts().await?;

        // Everything is renamed before anything is stored, so a bad prefix
        // leaves the registry untouched.
        let (tools, resources, templates, prompts) = match prefix {
            Some(prefix) => (
                tools.into_iter().map(|t| prefix_tool(prefix, t)).collect(),
                resources.into_iter().map(|r| prefix_resource(prefix, r)).collect(),
                templates
                    .into_iter()
                    .map(|t| prefix_template(prefix, t))
                    .collect::<Result<Vec<_>, _>>()?,
                prompts.into_iter().map(|p| prefix_prompt(prefix, p)).collect(),
            ),
            None => (tools, resources, templates, prompts),
        };

        let mut changed = BTreeSet::new();
        let mut count = 0;
        for tool in tools {
            self.store(&self.inner.tools, tool, DuplicatePolicy::Replace)?;
            changed.insert(ComponentKind::Tool);
            count += 1;
        }
        for resource in resources {
            self.store(&self.inner.resources, resource, DuplicatePolicy::Replace)?;
            changed.insert(ComponentKind::Resource);
            count += 1;
        }
        for template in templates {
            self.store(&self.inner.templates, template, DuplicatePolicy::Replace)?;
            changed.insert(ComponentKind::Template);
            count += 1;
        }
        for prompt in prompts {
            self.store(&self.inner.prompts, prompt, DuplicatePolicy::Replace)?;
            changed.insert(ComponentKind::Prompt);
            count += 1;
        }

        debug!(provider = provider.name(), prefix = ?prefix, count, "Imported components");
        notify::dispatch(changed);
        Ok(count)
    }

    fn next_seq(&self) -> u64 {
        self.inner.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Inserts under the component's key. Returns the stored component and
    /// whether storage changed. Replacement keeps the original position.
    fn store<T>(&self, map: &DashMap<Key, Slot<T>>, component: T, policy: DuplicatePolicy) -> Result<(T, bool), RegistryError>
    where
        T: Component + Clone,
    {
        match map.entry(component.key()) {
            Entry::Vacant(vacant) => {
                let seq = self.next_seq();
                vacant.insert(Slot {
                    seq,
                    component: component.clone(),
                });
                Ok((component, true))
            }
            Entry::Occupied(mut occupied) => match policy {
                DuplicatePolicy::Error => Err(RegistryError::Duplicate(occupied.key().to_string())),
                DuplicatePolicy::Ignore => Ok((occupied.get().component.clone(), false)),
                DuplicatePolicy::Warn => {
                    warn!(key = %occupied.key(), "Component already exists, replacing");
                    occupied.get_mut().component = component.clone();
                    Ok((component, true))
                }
                DuplicatePolicy::Replace => {
                    occupied.get_mut().component = component.clone();
                    Ok((component, true))
                }
            },
        }
    }

    fn stored_tools_named(&self, name: &str) -> Vec<Tool> {
        ordered(&self.inner.tools)
            .into_iter()
            .filter(|tool| tool.name() == name)
            .collect()
    }

    /// Applies the registered transform, serving the original on failure.
    fn transformed(&self, tool: Tool) -> Tool {
        let Some(transform) = self.get_transform(tool.name()) else {
            return tool;
        };
        match transform.apply(&tool) {
            Ok(transformed) => transformed,
            Err(e) => {
                warn!(tool = tool.name(), error = %e, "Transform failed, serving original tool");
                tool
            }
        }
    }

    /// Original names whose transformed tools are exposed as `name`.
    fn originals_exposed_as(&self, name: &str) -> Vec<String> {
        let mut originals: Vec<String> = self
            .inner
            .transforms
            .iter()
            .filter(|entry| entry.value().name.as_deref() == Some(name))
            .map(|entry| entry.key().clone())
            .collect();

        let renamed_away = self
            .inner
            .transforms
            .get(name)
            .is_some_and(|t| t.name.as_deref().is_some_and(|new| new != name));
        if !renamed_away && !originals.iter().any(|o| o == name) {
            originals.push(name.to_string());
        }
        originals
    }
}

fn ordered<T: Clone>(map: &DashMap<Key, Slot<T>>) -> Vec<T> {
    let mut slots: Vec<Slot<T>> = map.iter().map(|entry| entry.value().clone()).collect();
    slots.sort_by_key(|slot| slot.seq);
    slots.into_iter().map(|slot| slot.component).collect()
}

fn remove_named<T>(map: &DashMap<Key, Slot<T>>, name: &str) -> usize
where
    T: Component,
{
    let before = map.len();
    map.retain(|_, slot| slot.component.name() != name);
    before.saturating_sub(map.len())
}

#[async_trait]
impl Provider for LocalRegistry {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ProviderError> {
        Ok(ordered(&self.inner.tools)
            .into_iter()
            .map(|tool| self.transformed(tool))
            .collect())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ProviderError> {
        Ok(ordered(&self.inner.resources))
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, ProviderError> {
        Ok(ordered(&self.inner.templates))
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, ProviderError> {
        Ok(ordered(&self.inner.prompts))
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, ProviderError> {
        let mut candidates = Vec::new();
        for original in self.originals_exposed_as(name) {
            candidates.extend(
                self.stored_tools_named(&original)
                    .into_iter()
                    .map(|tool| self.transformed(tool))
                    .filter(|tool| tool.name() == name),
            );
        }
        Ok(highest_version(candidates))
    }
}
