//! Workflow documents embedded in generated media.
//!
//! Two incompatible shapes exist in the wild:
//! - **ui**: a node-and-link graph where each node carries a `mode` flag
//! - **api**: a flat `id -> {class_type, inputs}` map, every node active
//!
//! [`classify`] is the only place that inspects raw JSON; everything
//! downstream works on the typed [`WorkflowDocument`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

pub use super::projection::{
    input_files, models_and_loras, node_color, summarize_nodes, NodeCategory, NodeParam,
    NodeSummary,
};

/// Which shape a document had
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowFormat {
    Ui,
    Api,
}

impl std::fmt::Display for WorkflowFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowFormat::Ui => f.write_str("ui"),
            WorkflowFormat::Api => f.write_str("api"),
        }
    }
}

/// A classified workflow document
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowDocument {
    Ui(NodeGraph),
    Api(NodeMap),
}

/// Graph form: nodes plus links between them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {
    pub nodes: Vec<UiNode>,
    pub links: Vec<UiLink>,
}

/// Mode value of an enabled node
pub const MODE_ENABLED: i64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct UiNode {
    pub id: String,
    pub node_type: String,
    /// 0 = enabled; anything else is muted or bypassed
    pub mode: i64,
    pub widgets: Widgets,
}

impl UiNode {
    pub fn is_active(&self) -> bool {
        self.mode == MODE_ENABLED
    }
}

/// Widget values are usually positional, occasionally named
#[derive(Debug, Clone, PartialEq)]
pub enum Widgets {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Default for Widgets {
    fn default() -> Self {
        Widgets::Positional(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLink {
    pub origin: String,
    pub target: String,
}

/// Flat form keyed by node id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMap {
    pub nodes: BTreeMap<String, ApiNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiNode {
    pub class_type: String,
    pub inputs: Map<String, Value>,
}

/// Parameters of an active node, in whichever form the document used
#[derive(Debug, Clone, Copy)]
pub enum NodeParams<'a> {
    Widgets(&'a Widgets),
    Inputs(&'a Map<String, Value>),
}

impl<'a> NodeParams<'a> {
    /// Name each parameter, using `names` for positional widgets and
    /// `param_N` past the end of it
    pub fn named(&self, names: &[&str]) -> Vec<(Cow<'a, str>, &'a Value)> {
        match *self {
            NodeParams::Widgets(Widgets::Positional(values)) => values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let name = match names.get(i) {
                        Some(n) => Cow::Owned((*n).to_string()),
                        None => Cow::Owned(format!("param_{}", i + 1)),
                    };
                    (name, v)
                })
                .collect(),
            NodeParams::Widgets(Widgets::Named(map)) | NodeParams::Inputs(map) => map
                .iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_str()), v))
                .collect(),
        }
    }

    /// Every parameter value regardless of name
    pub fn values(&self) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        match *self {
            NodeParams::Widgets(Widgets::Positional(values)) => Box::new(values.iter()),
            NodeParams::Widgets(Widgets::Named(map)) | NodeParams::Inputs(map) => {
                Box::new(map.values())
            }
        }
    }
}

/// A node that survived active filtering
#[derive(Debug, Clone, Copy)]
pub struct ActiveNode<'a> {
    pub id: &'a str,
    pub node_type: &'a str,
    pub params: NodeParams<'a>,
}

impl WorkflowDocument {
    pub fn format(&self) -> WorkflowFormat {
        match self {
            WorkflowDocument::Ui(_) => WorkflowFormat::Ui,
            WorkflowDocument::Api(_) => WorkflowFormat::Api,
        }
    }

    /// Enabled nodes; every api node counts as enabled
    pub fn active_nodes(&self) -> Vec<ActiveNode<'_>> {
        match self {
            WorkflowDocument::Ui(graph) => graph
                .nodes
                .iter()
                .filter(|n| n.is_active())
                .map(|n| ActiveNode {
                    id: &n.id,
                    node_type: &n.node_type,
                    params: NodeParams::Widgets(&n.widgets),
                })
                .collect(),
            WorkflowDocument::Api(map) => map
                .nodes
                .iter()
                .map(|(id, n)| ActiveNode {
                    id,
                    node_type: &n.class_type,
                    params: NodeParams::Inputs(&n.inputs),
                })
                .collect(),
        }
    }
}

impl NodeGraph {
    /// Copy of the graph restricted to enabled nodes and the links
    /// whose endpoints are both enabled
    pub fn active(&self) -> NodeGraph {
        let nodes: Vec<UiNode> = self
            .nodes
            .iter()
            .filter(|n| n.is_active())
            .cloned()
            .collect();
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let links = self
            .links
            .iter()
            .filter(|l| ids.contains(l.origin.as_str()) && ids.contains(l.target.as_str()))
            .cloned()
            .collect();

        NodeGraph { nodes, links }
    }
}

/// Classify a parsed JSON candidate.
///
/// A wrapper exposing the payload under `workflow` or `prompt` (as an
/// object or as a JSON string) is unwrapped one level, `workflow` first.
/// Returns `None` for anything that is neither shape.
pub fn classify(value: &Value) -> Option<WorkflowDocument> {
    let obj = value.as_object()?;

    for key in ["workflow", "prompt"] {
        if let Some(payload) = obj.get(key).and_then(unwrap_payload) {
            if let Some(doc) = classify_shape(&payload) {
                return Some(doc);
            }
        }
    }

    classify_shape(value)
}

/// Parse a JSON string and classify it
pub fn classify_str(text: &str) -> Option<WorkflowDocument> {
    let value: Value = serde_json::from_str(text).ok()?;
    classify(&value)
}

fn unwrap_payload(value: &Value) -> Option<Cow<'_, Value>> {
    match value {
        Value::Object(_) => Some(Cow::Borrowed(value)),
        Value::String(s) => serde_json::from_str(s).ok().map(Cow::Owned),
        _ => None,
    }
}

fn classify_shape(value: &Value) -> Option<WorkflowDocument> {
    let obj = value.as_object()?;

    if let Some(Value::Array(nodes)) = obj.get("nodes") {
        let links = match obj.get("links") {
            Some(Value::Array(links)) => links.as_slice(),
            _ => &[],
        };
        return Some(WorkflowDocument::Ui(NodeGraph {
            nodes: nodes.iter().filter_map(parse_ui_node).collect(),
            links: links.iter().filter_map(parse_ui_link).collect(),
        }));
    }

    if obj.is_empty() {
        return None;
    }

    let mut nodes = BTreeMap::new();
    for (id, node) in obj {
        let node = node.as_object()?;
        let class_type = node.get("class_type")?.as_str()?.to_string();
        let inputs = match node.get("inputs") {
            Some(Value::Object(inputs)) => inputs.clone(),
            _ => Map::new(),
        };
        nodes.insert(id.clone(), ApiNode { class_type, inputs });
    }

    Some(WorkflowDocument::Api(NodeMap { nodes }))
}

fn node_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn parse_ui_node(value: &Value) -> Option<UiNode> {
    let node = value.as_object()?;
    let id = node_id(node.get("id")?)?;
    let node_type = node
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    let mode = node
        .get("mode")
        .and_then(Value::as_i64)
        .unwrap_or(MODE_ENABLED);
    let widgets = match node.get("widgets_values") {
        Some(Value::Array(values)) => Widgets::Positional(values.clone()),
        Some(Value::Object(map)) => Widgets::Named(map.clone()),
        _ => Widgets::default(),
    };

    Some(UiNode {
        id,
        node_type,
        mode,
        widgets,
    })
}

/// Links are `[id, origin, origin_slot, target, target_slot, type]`
/// or objects with `origin_id`/`target_id`
fn parse_ui_link(value: &Value) -> Option<UiLink> {
    let (origin, target) = match value {
        Value::Array(parts) => (parts.get(1)?, parts.get(3)?),
        Value::Object(map) => (map.get("origin_id")?, map.get("target_id")?),
        _ => return None,
    };

    Some(UiLink {
        origin: node_id(origin)?,
        target: node_id(target)?,
    })
}
