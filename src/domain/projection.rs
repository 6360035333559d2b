//! Projections computed from a classified workflow.
//!
//! Models, LoRAs and input files are what the catalog keeps; the node
//! summary is what a viewer shows for a single file.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::workflow::{ActiveNode, WorkflowDocument};

/// Extensions recognised as media references inside node parameters
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "jfif", "bmp", "tiff", "mp4", "mov", "webm", "mkv",
    "avi", "mp3", "wav", "ogg", "flac", "m4a", "aac",
];

/// Node types whose parameters name checkpoints
const CHECKPOINT_PARAMS: &[(&str, &[&str])] = &[
    ("CheckpointLoaderSimple", &["ckpt_name"]),
    ("Load Checkpoint", &["ckpt_name"]),
    ("CheckpointLoader", &["ckpt_name"]),
    ("ModelMerger", &["ckpt_name1", "ckpt_name2"]),
    ("UNETLoader", &["unet_name"]),
    ("DiffusersLoader", &["model_path"]),
];

/// Node types whose parameters name LoRAs
const LORA_PARAMS: &[(&str, &[&str])] = &[
    ("LoraLoader", &["lora_name"]),
    ("LoraLoaderModelOnly", &["lora_name"]),
    ("Load LoRA", &["lora_name"]),
    ("Lora Loader", &["lora_name"]),
    ("LoRALoader", &["lora_name"]),
    ("LoraLoaderBlockWeight", &["lora_name"]),
];

/// Positional widget names per node type
const WIDGET_NAMES: &[(&str, &[&str])] = &[
    ("CLIPTextEncode", &["text"]),
    (
        "KSampler",
        &["seed", "steps", "cfg", "sampler_name", "scheduler", "denoise"],
    ),
    (
        "KSamplerAdvanced",
        &[
            "add_noise",
            "noise_seed",
            "steps",
            "cfg",
            "sampler_name",
            "scheduler",
            "start_at_step",
            "end_at_step",
            "return_with_leftover_noise",
        ],
    ),
    ("Load Checkpoint", &["ckpt_name"]),
    ("CheckpointLoaderSimple", &["ckpt_name"]),
    ("Empty Latent Image", &["width", "height", "batch_size"]),
    ("LatentUpscale", &["upscale_method", "width", "height"]),
    ("SaveImage", &["filename_prefix"]),
    ("ModelMerger", &["ckpt_name1", "ckpt_name2", "ratio"]),
    ("Load Image", &["image"]),
    ("LoadImageMask", &["image"]),
    ("LoadImageOutput", &["image"]),
    ("VHS_LoadVideo", &["video"]),
    ("LoadAudio", &["audio"]),
    ("AudioLoader", &["audio"]),
    ("LoraLoader", &["lora_name", "strength_model", "strength_clip"]),
    ("LoraLoaderModelOnly", &["lora_name", "strength_model"]),
    ("Load LoRA", &["lora_name"]),
];

fn lookup(table: &[(&str, &'static [&'static str])], node_type: &str) -> Option<&'static [&'static str]> {
    table
        .iter()
        .find(|(t, _)| *t == node_type)
        .map(|(_, names)| *names)
}

/// Display category, in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Input,
    Model,
    Processing,
    Output,
    Others,
}

impl NodeCategory {
    pub fn of(node_type: &str) -> Self {
        match node_type {
            "Load Checkpoint" | "CheckpointLoaderSimple" | "Empty Latent Image"
            | "CLIPTextEncode" | "Load Image" | "LoadImageOutput" => NodeCategory::Input,
            "ModelMerger" => NodeCategory::Model,
            "KSampler" | "KSamplerAdvanced" | "VAEDecode" | "VAEEncode" | "LatentUpscale"
            | "ConditioningCombine" => NodeCategory::Processing,
            "PreviewImage" | "SaveImage" => NodeCategory::Output,
            _ => NodeCategory::Others,
        }
    }
}

/// Strip tool suffixes like ` [output]` and normalise separators
fn clean_reference(raw: &str) -> String {
    static SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();

    let normalized = raw.replace('\\', "/");
    let trimmed = normalized.trim();
    match SUFFIX.get_or_init(|| Regex::new(r"\s*\[.*?\]$").ok()) {
        Some(re) => re.replace(trimmed, "").into_owned(),
        None => trimmed.to_string(),
    }
}

fn has_media_extension(reference: &str) -> bool {
    Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| MEDIA_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Last path segment of a model reference
fn model_name(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let name = normalized.rsplit('/').next().unwrap_or("").trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn string_params<'a>(node: &ActiveNode<'a>, names: &[&str]) -> Vec<(Cow<'a, str>, &'a str)> {
    node.params
        .named(names)
        .into_iter()
        .filter_map(|(name, value)| value.as_str().map(|s| (name, s)))
        .collect()
}

/// Sorted, de-duplicated checkpoint and LoRA names
pub fn models_and_loras(doc: &WorkflowDocument) -> (Vec<String>, Vec<String>) {
    let mut models = BTreeSet::new();
    let mut loras = BTreeSet::new();

    for node in doc.active_nodes() {
        let checkpoint = lookup(CHECKPOINT_PARAMS, node.node_type);
        let lora = lookup(LORA_PARAMS, node.node_type);
        let names = checkpoint.or(lora).unwrap_or(&[]);

        for (param, value) in string_params(&node, names) {
            if checkpoint.is_some_and(|wanted| wanted.contains(&param.as_ref())) {
                models.extend(model_name(value));
            }
            if lora.is_some_and(|wanted| wanted.contains(&param.as_ref())) {
                loras.extend(model_name(value));
            }
        }
    }

    (models.into_iter().collect(), loras.into_iter().collect())
}

/// Sorted, de-duplicated base names of media files referenced by any
/// active node parameter
pub fn input_files(doc: &WorkflowDocument) -> Vec<String> {
    let mut files = BTreeSet::new();

    for node in doc.active_nodes() {
        for value in node.params.values().filter_map(Value::as_str) {
            if value.trim().is_empty() {
                continue;
            }
            let clean = clean_reference(value);
            if !has_media_extension(&clean) {
                continue;
            }
            if let Some(name) = Path::new(&clean).file_name().and_then(|n| n.to_str()) {
                files.insert(name.to_string());
            }
        }
    }

    files.into_iter().collect()
}

/// One row of the node summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub category: NodeCategory,
    pub color: String,
    pub params: Vec<NodeParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeParam {
    pub name: String,
    pub value: Value,
    pub is_input_file: bool,
    /// Path relative to the input root, when `is_input_file`
    pub input_path: Option<String>,
}

/// Deterministic `#rrggbb` color for a node type
pub fn node_color(node_type: &str) -> String {
    let digest = Sha256::digest(format!("{}:node-color", node_type).as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    let (r, g, b) = hsv_to_rgb(f64::from(hue) / 360.0, 0.7, 0.85);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    let to_byte = |c: f64| (c * 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

/// Find a referenced file under the input root, returning its
/// root-relative path
fn resolve_input(root: &Path, clean: &str) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let file_name = Path::new(clean).file_name()?;

    let candidates: [PathBuf; 2] = [root.join(clean), root.join(file_name)];
    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        let Ok(absolute) = candidate.canonicalize() else {
            continue;
        };
        if let Ok(relative) = absolute.strip_prefix(&root) {
            return Some(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

fn summarize_param(name: String, value: &Value, input_root: Option<&Path>) -> NodeParam {
    let mut param = NodeParam {
        name,
        value: value.clone(),
        is_input_file: false,
        input_path: None,
    };

    match value {
        Value::Array(items) => {
            param.value = match items.as_slice() {
                [Value::String(node), _] => Value::String(format!("(Link to {})", node)),
                _ => Value::String(value.to_string()),
            };
        }
        Value::String(s) if !s.trim().is_empty() => {
            let clean = clean_reference(s);
            if has_media_extension(&clean) {
                if let Some(relative) = input_root.and_then(|root| resolve_input(root, &clean)) {
                    param.is_input_file = true;
                    param.input_path = Some(relative);
                    param.value = Value::String(clean);
                }
            }
        }
        _ => {}
    }

    param
}

/// Active nodes ordered by category then id, with named parameters
pub fn summarize_nodes(doc: &WorkflowDocument, input_root: Option<&Path>) -> Vec<NodeSummary> {
    let mut nodes = doc.active_nodes();
    nodes.sort_by_key(|n| {
        (
            NodeCategory::of(n.node_type),
            n.id.parse::<i64>().map_err(|_| n.id.to_string()),
        )
    });

    nodes
        .into_iter()
        .map(|node| {
            let names = lookup(WIDGET_NAMES, node.node_type).unwrap_or(&[]);
            let params = node
                .params
                .named(names)
                .into_iter()
                .map(|(name, value)| summarize_param(name.into_owned(), value, input_root))
                .collect();

            NodeSummary {
                id: node.id.to_string(),
                node_type: node.node_type.to_string(),
                category: NodeCategory::of(node.node_type),
                color: node_color(node.node_type),
                params,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::classify;
    use serde_json::json;
    use tempfile::TempDir;

    fn ui_doc() -> WorkflowDocument {
        classify(&json!({
            "nodes": [
                {"id": 9, "type": "SaveImage", "widgets_values": ["ComfyUI"]},
                {"id": 4, "type": "CheckpointLoaderSimple", "widgets_values": ["sdxl\\base.safetensors"]},
                {"id": 5, "type": "LoraLoader", "widgets_values": ["styles/ink.safetensors", 1.0, 1.0]},
                {"id": 6, "type": "LoraLoader", "mode": 2, "widgets_values": ["muted.safetensors", 1.0, 1.0]},
                {"id": 7, "type": "Load Image", "widgets_values": ["sub/photo.png [input]", "image"]},
                {"id": 3, "type": "KSampler", "widgets_values": [42, 20, 7.5, "euler", "normal", 1.0]}
            ],
            "links": []
        }))
        .unwrap()
    }

    #[test]
    fn test_models_and_loras_ui() {
        let (models, loras) = models_and_loras(&ui_doc());
        assert_eq!(models, vec!["base.safetensors"]);
        assert_eq!(loras, vec!["ink.safetensors"]);
    }

    #[test]
    fn test_models_and_loras_api() {
        let doc = classify(&json!({
            "1": {"class_type": "ModelMerger", "inputs": {"ckpt_name1": "b.ckpt", "ckpt_name2": "a.ckpt", "ratio": 0.5}},
            "2": {"class_type": "LoraLoaderModelOnly", "inputs": {"lora_name": "x/y.safetensors", "model": ["1", 0]}},
            "3": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "a.ckpt"}}
        }))
        .unwrap();

        let (models, loras) = models_and_loras(&doc);
        assert_eq!(models, vec!["a.ckpt", "b.ckpt"]);
        assert_eq!(loras, vec!["y.safetensors"]);
    }

    #[test]
    fn test_input_files_strip_suffix() {
        assert_eq!(input_files(&ui_doc()), vec!["photo.png"]);
    }

    #[test]
    fn test_input_files_ignore_non_media() {
        let doc = classify(&json!({
            "1": {"class_type": "X", "inputs": {"a": "notes.txt", "b": "clip.MP4", "c": "  ", "d": 4}}
        }))
        .unwrap();
        assert_eq!(input_files(&doc), vec!["clip.MP4"]);
    }

    #[test]
    fn test_clean_reference() {
        assert_eq!(clean_reference(" a\\b.png [output] "), "a/b.png");
        assert_eq!(clean_reference("c.png"), "c.png");
    }

    #[test]
    fn test_node_color_is_stable() {
        let a = node_color("KSampler");
        assert_eq!(a, node_color("KSampler"));
        assert_eq!(a.len(), 7);
        assert!(a.starts_with('#'));
    }

    #[test]
    fn test_summary_order_and_links() {
        let summary = summarize_nodes(&ui_doc(), None);
        let ids: Vec<&str> = summary.iter().map(|s| s.id.as_str()).collect();
        // input (4, 7), processing (3), output (9), others (5); 6 is muted
        assert_eq!(ids, vec!["4", "7", "3", "9", "5"]);

        let sampler = &summary[2];
        assert_eq!(sampler.category, NodeCategory::Processing);
        assert_eq!(sampler.params[0].name, "seed");
        assert_eq!(sampler.params[0].value, json!(42));

        let api = classify(&json!({
            "2": {"class_type": "VAEDecode", "inputs": {"samples": ["3", 0]}}
        }))
        .unwrap();
        let summary = summarize_nodes(&api, None);
        assert_eq!(summary[0].params[0].value, json!("(Link to 3)"));
    }

    #[test]
    fn test_summary_flags_input_files() {
        let input = TempDir::new().unwrap();
        std::fs::create_dir_all(input.path().join("sub")).unwrap();
        std::fs::write(input.path().join("sub").join("photo.png"), b"png").unwrap();

        let summary = summarize_nodes(&ui_doc(), Some(input.path()));
        let load = summary.iter().find(|s| s.id == "7").unwrap();

        assert!(load.params[0].is_input_file);
        assert_eq!(load.params[0].input_path.as_deref(), Some("sub/photo.png"));
        assert_eq!(load.params[0].value, json!("sub/photo.png"));
        assert!(!load.params[1].is_input_file);
    }
}
