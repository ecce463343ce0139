//! Job-graph helpers: loading templates and patching node inputs.
//!
//! A job graph is ComfyUI's API-format workflow, an object keyed by node id
//! whose values carry `class_type` and `inputs`. Files may hold either the
//! bare graph or `{"prompt": graph}`.
use std::path::Path;

use serde_json::{json, Map, Value};
use tokio::fs;

use crate::error::{AppError, AppResult};

/// Sampler-level inputs that can be overridden by name on any node carrying them.
pub const KNOWN_PARAM_KEYS: &[&str] = &[
    "seed",
    "steps",
    "cfg",
    "sampler_name",
    "scheduler",
    "denoise",
    "width",
    "height",
    "batch_size",
    "ckpt_name",
];

/// Strip an optional `{"prompt": ...}` wrapper.
pub fn unwrap_graph(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("prompt").map_or(false, Value::is_object) => {
            map.remove("prompt").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Read and parse a graph file.
pub async fn load_graph(path: impl AsRef<Path>) -> AppResult<Value> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Workflow(format!("Failed to read workflow file {}: {}", path.display(), e)))?;
    let parsed: Value = serde_json::from_str(&content)
        .map_err(|e| AppError::Workflow(format!("Failed to parse workflow JSON {}: {}", path.display(), e)))?;
    let graph = unwrap_graph(parsed);
    if !graph.is_object() {
        return Err(AppError::Workflow(format!("{} does not contain a job graph", path.display())));
    }
    Ok(graph)
}

/// Load `<prompts_dir>/<name>.json`. Names are limited to a safe charset.
pub async fn load_named(prompts_dir: &str, name: &str) -> AppResult<Value> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::InvalidInput(format!("Invalid workflow name '{}'", name)));
    }
    let path = Path::new(prompts_dir).join(format!("{}.json", name));
    load_graph(path).await
}

/// Write positive/negative text into the graph's CLIP text nodes.
///
/// Follows the first KSampler's `positive`/`negative` links; when a link
/// can't be resolved, falls back to the `CLIPTextEncode` nodes in id order
/// (first positive, second negative).
pub fn apply_prompt_text(graph: &mut Value, positive: Option<&str>, negative: Option<&str>) {
    let sampler = first_node_of_class(graph, "KSampler");
    let linked = |input: &str| sampler.as_deref().and_then(|id| linked_node(graph, id, input));
    let positive_target = linked("positive");
    let negative_target = linked("negative");

    let clip_nodes = nodes_of_class(graph, "CLIPTextEncode");
    let positive_target = positive_target.or_else(|| clip_nodes.first().cloned());
    let negative_target = negative_target.or_else(|| clip_nodes.get(1).cloned());

    if let (Some(text), Some(node)) = (positive, positive_target) {
        set_input(graph, &node, "text", json!(text));
    }
    if let (Some(text), Some(node)) = (negative, negative_target) {
        set_input(graph, &node, "text", json!(text));
    }
}

/// Apply [`KNOWN_PARAM_KEYS`] from `params` to every node that already has
/// an input of that name.
pub fn apply_params(graph: &mut Value, params: &Map<String, Value>) {
    let overrides: Vec<(&str, &Value)> = KNOWN_PARAM_KEYS
        .iter()
        .filter_map(|&k| params.get(k).map(|v| (k, v)))
        .collect();
    if overrides.is_empty() {
        return;
    }
    let Some(nodes) = graph.as_object_mut() else { return };
    for node in nodes.values_mut() {
        if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
            for (key, value) in &overrides {
                if inputs.contains_key(*key) {
                    inputs.insert((*key).to_string(), (*value).clone());
                }
            }
        }
    }
}

/// Parse `a.b.c=value` overrides. Values are JSON when they parse as JSON,
/// plain strings otherwise.
pub fn parse_set_pairs(items: &[String]) -> AppResult<Vec<(Vec<String>, Value)>> {
    items
        .iter()
        .map(|item| {
            let (key, raw) = item
                .split_once('=')
                .ok_or_else(|| AppError::InvalidInput(format!("Invalid set '{}', expected KEY=VALUE", item)))?;
            let value: Value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.split('.').map(str::to_string).collect(), value))
        })
        .collect()
}

/// Set the value at `path`; every segment but the last must already exist.
pub fn apply_set_path(root: &mut Value, path: &[String], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else { return false };
    let mut current = root;
    for key in parents {
        match current.get_mut(key.as_str()) {
            Some(next) => current = next,
            None => return false,
        }
    }
    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.clone(), value);
            true
        }
        None => false,
    }
}

/// Give `SaveImage` nodes without a `filename_prefix` the default one.
pub fn ensure_filename_prefix(graph: &mut Value, prefix: &str) {
    let Some(nodes) = graph.as_object_mut() else { return };
    for node in nodes.values_mut() {
        if node.get("class_type").and_then(Value::as_str) != Some("SaveImage") {
            continue;
        }
        if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
            inputs
                .entry("filename_prefix")
                .or_insert_with(|| Value::String(prefix.to_string()));
        }
    }
}

/// Fail unless `graph[node_id].inputs` is an object.
pub fn require_node_inputs(graph: &Value, node_id: &str) -> AppResult<()> {
    match graph.get(node_id).and_then(|node| node.get("inputs")) {
        Some(inputs) if inputs.is_object() => Ok(()),
        _ => Err(AppError::InvalidInput(format!("Workflow has no node '{}' with inputs", node_id))),
    }
}

/// Set `graph[node_id].inputs[input]`, failing when the node is absent.
pub fn set_node_input(graph: &mut Value, node_id: &str, input: &str, value: Value) -> AppResult<()> {
    require_node_inputs(graph, node_id)?;
    set_input(graph, node_id, input, value);
    Ok(())
}

fn set_input(graph: &mut Value, node_id: &str, input: &str, value: Value) -> bool {
    match graph
        .get_mut(node_id)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(Value::as_object_mut)
    {
        Some(inputs) => {
            inputs.insert(input.to_string(), value);
            true
        }
        None => false,
    }
}

fn first_node_of_class(graph: &Value, class_type: &str) -> Option<String> {
    nodes_of_class(graph, class_type).into_iter().next()
}

/// Node ids of `class_type`, numeric ids in numeric order.
fn nodes_of_class(graph: &Value, class_type: &str) -> Vec<String> {
    let mut ids: Vec<String> = graph
        .as_object()
        .into_iter()
        .flat_map(|nodes| nodes.iter())
        .filter(|(_, node)| node.get("class_type").and_then(Value::as_str) == Some(class_type))
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    ids
}

/// Source node id of a link input such as `"positive": ["6", 0]`.
fn linked_node(graph: &Value, node_id: &str, input: &str) -> Option<String> {
    let source = graph.get(node_id)?.get("inputs")?.get(input)?.as_array()?.first()?;
    let id = match source {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    graph.get(&id).map(|_| id)
}
