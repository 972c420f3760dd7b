//! JSON Schema utilities.
//!
//! Schemas are plain [`serde_json::Value`]s. Internal type definitions live in
//! a root-level `$defs` map and are referenced with `#/$defs/<name>`.
//!
//! The central operation is [`dereference_refs`]: every reference to an
//! acyclic definition is inlined, and only definitions that sit on a
//! reference cycle survive in a minimal `$defs`. Running it twice gives the
//! same schema, which keeps chained transformations from accumulating or
//! colliding definitions.

use crate::error::SchemaError;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, VecDeque};

/// Marker set on output schemas whose raw values are boxed as
/// `{"result": value}`.
pub const WRAP_MARKER: &str = "x-wrap-result";

const DEFS: &str = "$defs";
const REF: &str = "$ref";
const LOCAL_DEF_PREFIX: &str = "#/$defs/";

/// Keywords whose values are instance data, never schemas.
const DATA_KEYWORDS: &[&str] = &["default", "examples", "enum", "const"];

/// Keywords whose values map arbitrary names to schemas.
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "$defs", "dependentSchemas"];

/// Options for [`compress_schema`].
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Parameters removed from `properties` and `required`
    pub prune_params: Vec<String>,
    /// Strip `title` annotations at every level
    pub prune_titles: bool,
    /// Strip `additionalProperties: false` at every level
    pub prune_additional_properties: bool,
    /// Inline references
    pub dereference: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            prune_params: Vec::new(),
            prune_titles: false,
            prune_additional_properties: true,
            dereference: true,
        }
    }
}

/// Wraps a non-object output schema as `{result: <schema>}` with the wrap
/// marker set. Definitions of the inner schema move to the wrapper root so
/// their references stay valid.
///
/// ```
/// use mcp_router::transform::schema::{is_wrapped_output, wrap_output_schema};
/// use serde_json::json;
///
/// let wrapped = wrap_output_schema(json!({"type": "integer"}));
/// assert!(is_wrapped_output(&wrapped));
/// assert_eq!(wrapped["properties"]["result"], json!({"type": "integer"}));
/// assert_eq!(wrapped["required"], json!(["result"]));
/// ```
pub fn wrap_output_schema(mut schema: Value) -> Value {
    let defs = schema.as_object_mut().and_then(|inner| inner.remove(DEFS));
    let mut wrapped = json!({
        "type": "object",
        "properties": { "result": schema },
        "required": ["result"],
        WRAP_MARKER: true,
    });
    if let (Some(defs), Some(root)) = (defs, wrapped.as_object_mut()) {
        root.insert(DEFS.to_string(), defs);
    }
    wrapped
}

/// Returns true if the schema carries the wrap marker.
pub fn is_wrapped_output(schema: &Value) -> bool {
    schema.get(WRAP_MARKER).and_then(Value::as_bool) == Some(true)
}

/// Returns true if the schema describes a JSON object.
pub fn is_object_schema(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(_) => false,
        None => schema.get("properties").is_some(),
    }
}

/// Removes a parameter from `properties` and `required`.
///
/// An emptied `required` list is removed; an emptied `properties` object is
/// kept. Unreachable definitions are dropped afterwards.
pub fn prune_param(mut schema: Value, name: &str) -> Value {
    let Some(root) = schema.as_object_mut() else {
        return schema;
    };
    let removed = root
        .get_mut("properties")
        .and_then(Value::as_object_mut)
        .and_then(|properties| properties.remove(name))
        .is_some();
    if !removed {
        return schema;
    }
    remove_required(root, name);
    prune_unused_defs(schema)
}

pub(crate) fn remove_required(root: &mut Map<String, Value>, name: &str) {
    let emptied = match root.get_mut("required").and_then(Value::as_array_mut) {
        Some(required) => {
            required.retain(|entry| entry.as_str() != Some(name));
            required.is_empty()
        }
        None => false,
    };
    if emptied {
        root.remove("required");
    }
}

/// Drops every `$defs` entry that no reference reaches from the schema body.
pub fn prune_unused_defs(mut schema: Value) -> Value {
    let Some(root) = schema.as_object_mut() else {
        return schema;
    };
    let Some(Value::Object(defs)) = root.remove(DEFS) else {
        return schema;
    };

    let reached = reachable_defs(root, &defs);
    let kept: Map<String, Value> = defs.into_iter().filter(|(name, _)| reached.contains(name)).collect();
    if !kept.is_empty() {
        root.insert(DEFS.to_string(), Value::Object(kept));
    }
    schema
}

/// Hoists the definition behind a bare root `$ref` into the root.
///
/// Only applies when the root has a local `$ref`, no `type`, and the target
/// exists; `$defs` is kept for nested references. Anything else is returned
/// unchanged.
///
/// ```
/// use mcp_router::transform::schema::resolve_root_ref;
/// use serde_json::json;
///
/// let schema = json!({
///     "$defs": {"Node": {"type": "object", "properties": {"id": {"type": "string"}}}},
///     "$ref": "#/$defs/Node"
/// });
/// let resolved = resolve_root_ref(schema);
/// assert_eq!(resolved["type"], "object");
/// assert!(resolved.get("$ref").is_none());
/// assert!(resolved.get("$defs").is_some());
/// ```
pub fn resolve_root_ref(schema: Value) -> Value {
    let target = match (&schema, schema.get("type")) {
        (Value::Object(root), None) => root
            .get(REF)
            .and_then(Value::as_str)
            .and_then(local_def_name)
            .and_then(|name| root.get(DEFS).and_then(|defs| defs.get(name)))
            .and_then(Value::as_object)
            .cloned(),
        _ => None,
    };
    let (Some(target), Value::Object(root)) = (target, schema.clone()) else {
        return schema;
    };

    let mut resolved = target;
    for (key, value) in root {
        if key != REF {
            resolved.insert(key, value);
        }
    }
    Value::Object(resolved)
}

/// Inlines every reference to an acyclic local definition.
///
/// Definitions on a reference cycle are kept as `$ref`s in a minimal `$defs`
/// holding only cyclic definitions that are still reached. Keywords next to
/// a `$ref` override the inlined definition. Data keywords (`default`,
/// `examples`, `enum`, `const`) are copied verbatim. References outside
/// `#/$defs/` are left alone.
///
/// # Errors
///
/// `SchemaError::UnresolvableReference` for a reachable local reference
/// whose definition does not exist.
///
/// # Examples
///
/// ```
/// use mcp_router::transform::schema::dereference_refs;
/// use serde_json::json;
///
/// let schema = json!({
///     "type": "object",
///     "properties": {"status": {"$ref": "#/$defs/Status", "default": "on"}},
///     "$defs": {"Status": {"type": "string", "enum": ["on", "off"]}}
/// });
/// let result = dereference_refs(&schema).unwrap();
/// assert_eq!(
///     result["properties"]["status"],
///     json!({"type": "string", "enum": ["on", "off"], "default": "on"})
/// );
/// assert!(result.get("$defs").is_none());
/// ```
pub fn dereference_refs(schema: &Value) -> Result<Value, SchemaError> {
    let Value::Object(root) = schema else {
        return Ok(schema.clone());
    };
    let defs = root.get(DEFS).and_then(Value::as_object).cloned().unwrap_or_default();
    let cyclic = cyclic_defs(&defs);
    let inliner = Inliner {
        defs: &defs,
        cyclic: &cyclic,
    };

    // The root goes through the inliner as a schema so a root `$ref` is
    // inlined like any other.
    let body: Map<String, Value> = root
        .iter()
        .filter(|(key, _)| key.as_str() != DEFS)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let mut stack = Vec::new();
    let mut body = match inliner.schema(&Value::Object(body), &mut stack)? {
        Value::Object(body) => body,
        other => return Ok(other),
    };

    let reached = reachable_defs(&body, &defs);
    let mut kept = Map::new();
    for (name, definition) in &defs {
        if cyclic.contains(name) && reached.contains(name) {
            kept.insert(name.clone(), inliner.schema(definition, &mut stack)?);
        }
    }
    if !kept.is_empty() {
        body.insert(DEFS.to_string(), Value::Object(kept));
    }

    Ok(resolve_root_ref(Value::Object(body)))
}

/// Merges `overlay` over `base`.
///
/// Top-level keys of `overlay` win, except that `properties` merge per
/// property, `required` lists are unioned, and `$defs` stores are unioned
/// with `overlay` winning per definition. The merged schema is then garbage
/// collected and dereferenced, so merging a result with itself is a no-op.
///
/// # Errors
///
/// `SchemaError::InvalidSchema` if either side is not an object, and any
/// error from [`dereference_refs`].
pub fn merge_schemas(base: &Value, overlay: &Value) -> Result<Value, SchemaError> {
    let (Value::Object(base), Value::Object(overlay)) = (base, overlay) else {
        return Err(SchemaError::InvalidSchema("only object schemas can be merged".to_string()));
    };

    let mut merged = base.clone();
    for (key, value) in overlay {
        match (key.as_str(), merged.get_mut(key), value) {
            ("properties" | DEFS, Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (name, schema) in incoming {
                    existing.insert(name.clone(), schema.clone());
                }
            }
            ("required", Some(Value::Array(existing)), Value::Array(incoming)) => {
                for entry in incoming {
                    if !existing.contains(entry) {
                        existing.push(entry.clone());
                    }
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    if merged.get("required").and_then(Value::as_array).is_some_and(Vec::is_empty) {
        merged.remove("required");
    }

    dereference_refs(&prune_unused_defs(Value::Object(merged)))
}

/// Applies the pruning steps selected in `options`.
///
/// # Errors
///
/// Propagates [`dereference_refs`] failures when dereferencing is enabled.
pub fn compress_schema(schema: &Value, options: &CompressOptions) -> Result<Value, SchemaError> {
    let mut schema = schema.clone();
    for name in &options.prune_params {
        schema = prune_param(schema, name);
    }

    schema = if options.dereference {
        dereference_refs(&schema)?
    } else {
        prune_unused_defs(schema)
    };

    if options.prune_titles || options.prune_additional_properties {
        visit_schemas_mut(&mut schema, &mut |object: &mut Map<String, Value>| {
            if options.prune_titles && object.get("title").is_some_and(Value::is_string) {
                object.remove("title");
            }
            if options.prune_additional_properties && object.get("additionalProperties") == Some(&Value::Bool(false)) {
                object.remove("additionalProperties");
            }
        });
    }
    Ok(schema)
}

fn local_def_name(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(LOCAL_DEF_PREFIX)
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

fn decode_pointer(name: &str) -> String {
    name.replace("~1", "/").replace("~0", "~")
}

/// Calls `f` on every schema object, skipping data keywords.
fn visit_schemas_mut(value: &mut Value, f: &mut dyn FnMut(&mut Map<String, Value>)) {
    match value {
        Value::Object(object) => {
            f(object);
            for (key, child) in object.iter_mut() {
                if DATA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                match child {
                    Value::Object(named) if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) => {
                        for schema in named.values_mut() {
                            visit_schemas_mut(schema, f);
                        }
                    }
                    _ => visit_schemas_mut(child, f),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                visit_schemas_mut(item, f);
            }
        }
        _ => {}
    }
}

/// Collects local definition names referenced anywhere under `value`.
fn collect_refs(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(object) => {
            if let Some(name) = object.get(REF).and_then(Value::as_str).and_then(local_def_name) {
                refs.insert(decode_pointer(name));
            }
            for (key, child) in object {
                collect_keyword_refs(key, child, refs);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_refs(item, refs)),
        _ => {}
    }
}

fn collect_keyword_refs(key: &str, value: &Value, refs: &mut BTreeSet<String>) {
    if DATA_KEYWORDS.contains(&key) {
        return;
    }
    match value {
        Value::Object(named) if SCHEMA_MAP_KEYWORDS.contains(&key) => {
            named.values().for_each(|schema| collect_refs(schema, refs));
        }
        _ => collect_refs(value, refs),
    }
}

/// Definitions reachable from the body of `root` (its `$defs` excluded),
/// following references through definitions.
fn reachable_defs(root: &Map<String, Value>, defs: &Map<String, Value>) -> BTreeSet<String> {
    let mut start = BTreeSet::new();
    if let Some(name) = root.get(REF).and_then(Value::as_str).and_then(local_def_name) {
        start.insert(decode_pointer(name));
    }
    for (key, value) in root {
        if key != DEFS {
            collect_keyword_refs(key, value, &mut start);
        }
    }

    let mut reached = BTreeSet::new();
    let mut queue: VecDeque<String> = start.into_iter().collect();
    while let Some(name) = queue.pop_front() {
        if !reached.insert(name.clone()) {
            continue;
        }
        if let Some(definition) = defs.get(&name) {
            let mut next = BTreeSet::new();
            collect_refs(definition, &mut next);
            queue.extend(next.into_iter().filter(|n| !reached.contains(n)));
        }
    }
    reached
}

/// Names of definitions that can reach themselves through references.
fn cyclic_defs(defs: &Map<String, Value>) -> BTreeSet<String> {
    let edges = |name: &str| -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        if let Some(definition) = defs.get(name) {
            collect_refs(definition, &mut refs);
        }
        refs
    };

    defs.keys()
        .filter(|name| {
            let mut seen = BTreeSet::new();
            let mut queue: VecDeque<String> = edges(name.as_str()).into_iter().collect();
            while let Some(current) = queue.pop_front() {
                if &current == *name {
                    return true;
                }
                if seen.insert(current.clone()) {
                    queue.extend(edges(current.as_str()));
                }
            }
            false
        })
        .cloned()
        .collect()
}

struct Inliner<'a> {
    defs: &'a Map<String, Value>,
    cyclic: &'a BTreeSet<String>,
}

impl Inliner<'_> {
    /// Inlines the value of one keyword of a schema object.
    fn keyword(&self, key: &str, value: &Value, stack: &mut Vec<String>) -> Result<Value, SchemaError> {
        if DATA_KEYWORDS.contains(&key) {
            return Ok(value.clone());
        }
        match value {
            Value::Object(named) if SCHEMA_MAP_KEYWORDS.contains(&key) => {
                let mut out = Map::new();
                for (name, schema) in named {
                    out.insert(name.clone(), self.schema(schema, stack)?);
                }
                Ok(Value::Object(out))
            }
            _ => self.schema(value, stack),
        }
    }

    fn schema(&self, value: &Value, stack: &mut Vec<String>) -> Result<Value, SchemaError> {
        match value {
            Value::Object(object) => {
                if let Some(reference) = object.get(REF).and_then(Value::as_str) {
                    if let Some(raw) = local_def_name(reference) {
                        let name = decode_pointer(raw);
                        let definition = self
                            .defs
                            .get(&name)
                            .ok_or_else(|| SchemaError::UnresolvableReference(reference.to_string()))?;

                        // The stack guards against cycles the precomputed set missed.
                        if !self.cyclic.contains(&name) && !stack.contains(&name) {
                            stack.push(name);
                            let resolved = self.schema(definition, stack);
                            stack.pop();
                            let resolved = resolved?;

                            let mut siblings = Map::new();
                            for (key, child) in object {
                                if key != REF {
                                    siblings.insert(key.clone(), self.keyword(key, child, stack)?);
                                }
                            }
                            return Ok(combine(resolved, siblings));
                        }
                    }
                }

                let mut out = Map::new();
                for (key, child) in object {
                    out.insert(key.clone(), self.keyword(key, child, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.schema(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}

/// Overlays the keywords found next to a `$ref` on the inlined definition.
fn combine(resolved: Value, siblings: Map<String, Value>) -> Value {
    if siblings.is_empty() {
        return resolved;
    }
    match resolved {
        Value::Object(mut object) => {
            object.extend(siblings);
            Value::Object(object)
        }
        Value::Bool(true) => Value::Object(siblings),
        other => {
            let mut object = siblings;
            object.insert("allOf".to_string(), Value::Array(vec![other]));
            Value::Object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"root": {"$ref": "#/$defs/Node"}},
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": {"$ref": "#/$defs/Label"},
                        "children": {"type": "array", "items": {"$ref": "#/$defs/Node"}}
                    }
                },
                "Label": {"type": "string"},
                "Unused": {"type": "integer"}
            }
        })
    }

    #[test]
    fn test_prune_param() {
        let schema = json!({
            "type": "object",
            "properties": {"foo": {"type": "string"}, "bar": {"type": "integer"}},
            "required": ["foo", "bar"]
        });
        let pruned = prune_param(schema, "bar");
        assert_eq!(pruned["properties"], json!({"foo": {"type": "string"}}));
        assert_eq!(pruned["required"], json!(["foo"]));
    }

    #[test]
    fn test_prune_last_param_keeps_empty_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"foo": {"type": "string"}},
            "required": ["foo"]
        });
        let pruned = prune_param(schema, "foo");
        assert_eq!(pruned["properties"], json!({}));
        assert!(pruned.get("required").is_none());
    }

    #[test]
    fn test_prune_missing_param_is_noop() {
        let schema = json!({"type": "object", "properties": {"foo": {"type": "string"}}});
        assert_eq!(prune_param(schema.clone(), "nope"), schema);
    }

    #[test]
    fn test_prune_param_drops_orphaned_defs() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"$ref": "#/$defs/A"}, "b": {"type": "string"}},
            "$defs": {"A": {"type": "integer"}}
        });
        let pruned = prune_param(schema, "a");
        assert!(pruned.get("$defs").is_none());
    }

    #[test]
    fn test_prune_unused_defs_follows_chains() {
        let schema = json!({
            "properties": {"a": {"$ref": "#/$defs/A"}},
            "$defs": {
                "A": {"properties": {"b": {"$ref": "#/$defs/B"}}},
                "B": {"type": "string"},
                "C": {"type": "string"}
            }
        });
        let pruned = prune_unused_defs(schema);
        let defs = pruned["$defs"].as_object().unwrap();
        assert!(defs.contains_key("A"));
        assert!(defs.contains_key("B"));
        assert!(!defs.contains_key("C"));
    }

    #[test]
    fn test_dereference_nested_refs() {
        let schema = json!({
            "type": "object",
            "properties": {"foo": {"$ref": "#/$defs/Foo"}},
            "$defs": {
                "Foo": {"type": "object", "properties": {"nested": {"$ref": "#/$defs/Nested"}}},
                "Nested": {"type": "string"}
            }
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(result["properties"]["foo"]["properties"]["nested"], json!({"type": "string"}));
        assert!(result.get("$defs").is_none());
    }

    #[test]
    fn test_dereference_preserves_siblings_in_lists() {
        let schema = json!({
            "type": "object",
            "properties": {
                "value": {
                    "anyOf": [
                        {"$ref": "#/$defs/S", "description": "As string"},
                        {"$ref": "#/$defs/I", "description": "As integer"}
                    ]
                }
            },
            "$defs": {"S": {"type": "string"}, "I": {"type": "integer"}}
        });
        let result = dereference_refs(&schema).unwrap();
        let any_of = result["properties"]["value"]["anyOf"].as_array().unwrap();
        assert_eq!(any_of[0], json!({"type": "string", "description": "As string"}));
        assert_eq!(any_of[1], json!({"type": "integer", "description": "As integer"}));
    }

    #[test]
    fn test_dereference_leaves_data_keywords_alone() {
        let schema = json!({
            "type": "object",
            "properties": {
                "template": {
                    "type": "object",
                    "default": {"$ref": "#/$defs/Missing"},
                    "examples": [{"$ref": "#/$defs/Missing"}]
                }
            }
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(result, schema);
    }

    #[test]
    fn test_dereference_property_named_like_keyword() {
        let schema = json!({
            "type": "object",
            "properties": {"default": {"$ref": "#/$defs/D"}},
            "$defs": {"D": {"type": "boolean"}}
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(result["properties"]["default"], json!({"type": "boolean"}));
    }

    #[test]
    fn test_prune_unused_defs_sees_property_named_default() {
        let schema = json!({
            "type": "object",
            "properties": {"default": {"$ref": "#/$defs/D"}},
            "$defs": {"D": {"type": "boolean"}}
        });
        let pruned = prune_unused_defs(schema.clone());
        assert_eq!(pruned, schema);
    }

    #[test]
    fn test_dereference_missing_def_is_error() {
        let schema = json!({"properties": {"a": {"$ref": "#/$defs/Missing"}}});
        let result = dereference_refs(&schema);
        assert!(matches!(result, Err(SchemaError::UnresolvableReference(r)) if r == "#/$defs/Missing"));
    }

    #[test]
    fn test_dereference_external_ref_untouched() {
        let schema = json!({"properties": {"a": {"$ref": "https://example.com/a.json"}}});
        assert_eq!(dereference_refs(&schema).unwrap(), schema);
    }

    #[test]
    fn test_self_referential_keeps_minimal_defs() {
        let result = dereference_refs(&tree_schema()).unwrap();

        let defs = result["$defs"].as_object().unwrap();
        assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["Node"]);
        assert_eq!(result["properties"]["root"], json!({"$ref": "#/$defs/Node"}));
        assert_eq!(defs["Node"]["properties"]["value"], json!({"type": "string"}));
        assert_eq!(defs["Node"]["properties"]["children"]["items"], json!({"$ref": "#/$defs/Node"}));
    }

    #[test]
    fn test_mutually_recursive_defs() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"$ref": "#/$defs/A"}, "leaf": {"$ref": "#/$defs/Leaf"}},
            "$defs": {
                "A": {"type": "object", "properties": {"b": {"$ref": "#/$defs/B"}}},
                "B": {"type": "object", "properties": {"a": {"$ref": "#/$defs/A"}}},
                "Leaf": {"type": "null"}
            }
        });
        let result = dereference_refs(&schema).unwrap();
        let defs = result["$defs"].as_object().unwrap();
        assert!(defs.contains_key("A"));
        assert!(defs.contains_key("B"));
        assert!(!defs.contains_key("Leaf"));
        assert_eq!(result["properties"]["leaf"], json!({"type": "null"}));
    }

    #[test]
    fn test_acyclic_def_pointing_into_cycle_is_inlined() {
        let schema = json!({
            "properties": {"wrapper": {"$ref": "#/$defs/Wrapper"}},
            "$defs": {
                "Wrapper": {"type": "object", "properties": {"node": {"$ref": "#/$defs/Node"}}},
                "Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}
            }
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(result["properties"]["wrapper"]["properties"]["node"], json!({"$ref": "#/$defs/Node"}));
        assert_eq!(result["$defs"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_circular_root_ref_is_hoisted() {
        let schema = json!({
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {"children": {"type": "array", "items": {"$ref": "#/$defs/Node"}}}
                }
            },
            "$ref": "#/$defs/Node"
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(result["type"], "object");
        assert!(result.get("$ref").is_none());
        assert!(result["$defs"].get("Node").is_some());
    }

    #[test]
    fn test_acyclic_root_ref_is_inlined() {
        let schema = json!({
            "$ref": "#/$defs/A",
            "description": "root",
            "$defs": {"A": {"type": "object", "properties": {"x": {"type": "integer"}}}}
        });
        let result = dereference_refs(&schema).unwrap();
        assert_eq!(
            result,
            json!({"type": "object", "properties": {"x": {"type": "integer"}}, "description": "root"})
        );
    }

    #[test]
    fn test_merge_inlines_acyclic_root_ref() {
        let schema = json!({
            "$ref": "#/$defs/A",
            "$defs": {"A": {"type": "object", "properties": {"x": {"type": "integer"}}}}
        });
        let merged = merge_schemas(&schema, &json!({})).unwrap();
        assert!(merged.get("$ref").is_none());
        assert_eq!(merged["properties"]["x"], json!({"type": "integer"}));
    }

    #[test]
    fn test_prune_unused_defs_keeps_root_ref_target() {
        let schema = json!({"$ref": "#/$defs/A", "$defs": {"A": {"type": "object"}, "B": {}}});
        let pruned = prune_unused_defs(schema);
        let defs = pruned["$defs"].as_object().unwrap();
        assert!(defs.contains_key("A"));
        assert!(!defs.contains_key("B"));
    }

    #[test]
    fn test_dereference_is_idempotent() {
        let once = dereference_refs(&tree_schema()).unwrap();
        let twice = dereference_refs(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_resolve_root_ref_unchanged_cases() {
        let typed = json!({"type": "object", "$ref": "#/$defs/A", "$defs": {"A": {}}});
        assert_eq!(resolve_root_ref(typed.clone()), typed);

        let external = json!({"$ref": "https://example.com/schema.json"});
        assert_eq!(resolve_root_ref(external.clone()), external);

        let missing = json!({"$ref": "#/$defs/Missing", "$defs": {"Other": {}}});
        assert_eq!(resolve_root_ref(missing.clone()), missing);
    }

    #[test]
    fn test_merge_overlay_wins_and_unions() {
        let base = json!({
            "type": "object",
            "description": "base",
            "properties": {"a": {"type": "string"}, "b": {"type": "integer"}},
            "required": ["a"]
        });
        let overlay = json!({
            "description": "overlay",
            "properties": {"b": {"type": "number"}, "c": {"type": "boolean"}},
            "required": ["c", "a"]
        });
        let merged = merge_schemas(&base, &overlay).unwrap();
        assert_eq!(merged["description"], "overlay");
        assert_eq!(merged["properties"]["b"], json!({"type": "number"}));
        assert_eq!(merged["properties"]["a"], json!({"type": "string"}));
        assert_eq!(merged["required"], json!(["a", "c"]));
    }

    #[test]
    fn test_merge_collects_garbage_and_inlines() {
        let base = json!({
            "type": "object",
            "properties": {"a": {"$ref": "#/$defs/A"}},
            "$defs": {"A": {"type": "string"}, "Stale": {"type": "integer"}}
        });
        let overlay = json!({
            "properties": {"b": {"$ref": "#/$defs/B"}},
            "$defs": {"B": {"type": "boolean"}}
        });
        let merged = merge_schemas(&base, &overlay).unwrap();
        assert!(merged.get("$defs").is_none());
        assert_eq!(merged["properties"]["a"], json!({"type": "string"}));
        assert_eq!(merged["properties"]["b"], json!({"type": "boolean"}));
    }

    #[test]
    fn test_merge_with_itself_is_noop() {
        let merged = merge_schemas(&tree_schema(), &json!({})).unwrap();
        assert_eq!(merge_schemas(&merged, &merged).unwrap(), merged);
    }

    #[test]
    fn test_merge_rejects_non_objects() {
        assert!(matches!(
            merge_schemas(&json!(true), &json!({})),
            Err(SchemaError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_compress_prunes_params_and_additional_properties() {
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "keep": {"type": "object", "additionalProperties": false},
                "remove": {"$ref": "#/$defs/R"}
            },
            "required": ["keep", "remove"],
            "$defs": {"R": {"type": "string"}}
        });
        let options = CompressOptions {
            prune_params: vec!["remove".to_string()],
            ..CompressOptions::default()
        };
        let result = compress_schema(&schema, &options).unwrap();
        assert!(result.get("additionalProperties").is_none());
        assert!(result["properties"]["keep"].get("additionalProperties").is_none());
        assert!(result["properties"].get("remove").is_none());
        assert_eq!(result["required"], json!(["keep"]));
        assert!(result.get("$defs").is_none());
    }

    #[test]
    fn test_compress_keeps_additional_properties_when_disabled() {
        let schema = json!({"type": "object", "additionalProperties": false});
        let options = CompressOptions {
            prune_additional_properties: false,
            ..CompressOptions::default()
        };
        let result = compress_schema(&schema, &options).unwrap();
        assert_eq!(result["additionalProperties"], false);
    }

    #[test]
    fn test_prune_titles_keeps_parameter_named_title() {
        let schema = json!({
            "type": "object",
            "title": "Outer",
            "properties": {
                "title": {
                    "type": "object",
                    "title": "TitleObject",
                    "properties": {"subtitle": {"type": "string", "title": "SubTitle"}}
                },
                "normal": {"type": "string", "title": "Normal"}
            }
        });
        let options = CompressOptions {
            prune_titles: true,
            ..CompressOptions::default()
        };
        let result = compress_schema(&schema, &options).unwrap();
        assert!(result.get("title").is_none());
        assert!(result["properties"].get("title").is_some());
        assert!(result["properties"]["title"].get("title").is_none());
        assert!(result["properties"]["title"]["properties"]["subtitle"].get("title").is_none());
        assert!(result["properties"]["normal"].get("title").is_none());
    }

    #[test]
    fn test_wrap_hoists_defs() {
        let wrapped = wrap_output_schema(json!({
            "type": "array",
            "items": {"$ref": "#/$defs/Node"},
            "$defs": {"Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}}
        }));
        assert!(wrapped["$defs"].get("Node").is_some());
        assert!(wrapped["properties"]["result"].get("$defs").is_none());
        assert!(is_wrapped_output(&wrapped));
        assert!(!is_wrapped_output(&json!({"type": "object"})));
    }

    #[test]
    fn test_is_object_schema() {
        assert!(is_object_schema(&json!({"type": "object"})));
        assert!(is_object_schema(&json!({"properties": {}})));
        assert!(!is_object_schema(&json!({"type": "string"})));
        assert!(!is_object_schema(&json!({"type": ["object", "null"]})));
    }
}
