//! Workflow Integration Tests
//!
//! Classification, active-node filtering and extraction preference.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use mediacat::domain::projection::{input_files, models_and_loras};
use mediacat::domain::workflow::NodeGraph;
use mediacat::domain::workflow::classify_str;
use mediacat::domain::{classify, MediaKind, WorkflowDocument, WorkflowFormat};
use mediacat::media::{extract_workflow, WorkflowSource};
use serde_json::json;
use tempfile::TempDir;

const UI_WORKFLOW: &str = r#"{"nodes":[{"id":4,"type":"CheckpointLoaderSimple","mode":0,"widgets_values":["sdxl/base.safetensors"]},{"id":7,"type":"LoraLoader","mode":0,"widgets_values":["ink.safetensors",1.0,1.0]}],"links":[[1,4,0,7,0,"MODEL"]]}"#;
const API_PROMPT: &str = r#"{"3":{"class_type":"KSampler","inputs":{"seed":1}},"4":{"class_type":"CheckpointLoaderSimple","inputs":{"ckpt_name":"api.safetensors"}}}"#;

fn ui_graph(doc: WorkflowDocument) -> NodeGraph {
    match doc {
        WorkflowDocument::Ui(graph) => graph,
        WorkflowDocument::Api(_) => panic!("expected ui document"),
    }
}

/// PNG with the given tEXt chunks ahead of the image data
fn png_with_text(path: &Path, chunks: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut encoder = png::Encoder::new(BufWriter::new(file), 4, 4);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    for (key, text) in chunks {
        encoder
            .add_text_chunk(key.to_string(), text.to_string())
            .unwrap();
    }
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(&[128u8; 4 * 4 * 3]).unwrap();
}

#[test]
fn test_disabled_node_and_its_links_are_filtered() {
    let doc = classify(&json!({
        "nodes": [
            {"id": 1, "type": "CheckpointLoaderSimple", "mode": 0},
            {"id": 2, "type": "KSampler", "mode": 2},
            {"id": 3, "type": "SaveImage"}
        ],
        "links": [
            [10, 1, 0, 2, 0, "MODEL"],
            [11, 1, 0, 3, 0, "IMAGE"]
        ]
    }))
    .unwrap();

    assert_eq!(doc.active_nodes().len(), 2);

    let active = ui_graph(doc).active();
    assert_eq!(active.nodes.len(), 2);
    assert!(active
        .links
        .iter()
        .all(|l| l.origin != "2" && l.target != "2"));
    assert_eq!(active.links.len(), 1);
}

#[test]
fn test_api_nodes_are_all_active() {
    let doc = classify(&serde_json::from_str(API_PROMPT).unwrap()).unwrap();
    assert_eq!(doc.format(), WorkflowFormat::Api);
    assert_eq!(doc.active_nodes().len(), 2);
}

#[test]
fn test_wrapper_string_payload() {
    let wrapped = json!({ "workflow": UI_WORKFLOW });
    assert_eq!(classify(&wrapped).unwrap().format(), WorkflowFormat::Ui);

    let prompt_only = json!({ "prompt": API_PROMPT });
    assert_eq!(classify(&prompt_only).unwrap().format(), WorkflowFormat::Api);

    assert_eq!(classify_str(UI_WORKFLOW).unwrap().format(), WorkflowFormat::Ui);
    assert!(classify_str("{\"nodes\": [").is_none());
}

#[test]
fn test_not_a_workflow() {
    assert!(classify(&json!({})).is_none());
    assert!(classify(&json!({"1": {"inputs": {}}})).is_none());
    assert!(classify(&json!([1, 2, 3])).is_none());
    assert!(classify(&json!({"nodes": "nope"})).is_none());
}

#[tokio::test]
async fn test_ui_preferred_over_earlier_api() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mixed.bin");
    std::fs::write(&path, format!("\x00\x01{}\x02junk{}\x03", API_PROMPT, UI_WORKFLOW)).unwrap();

    let found = extract_workflow(&path, MediaKind::Unknown, None)
        .await
        .unwrap();
    assert_eq!(found.format(), WorkflowFormat::Ui);
}

#[tokio::test]
async fn test_api_kept_when_no_ui() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("api.bin");
    std::fs::write(&path, format!("head{}tail", API_PROMPT)).unwrap();

    let found = extract_workflow(&path, MediaKind::Unknown, None)
        .await
        .unwrap();
    assert_eq!(found.format(), WorkflowFormat::Api);
    assert_eq!(
        models_and_loras(&found.document).0,
        vec!["api.safetensors"]
    );
}

#[tokio::test]
async fn test_png_text_chunks() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("gen.png");
    png_with_text(&path, &[("prompt", API_PROMPT), ("workflow", UI_WORKFLOW)]);

    let found = extract_workflow(&path, MediaKind::Image, None)
        .await
        .unwrap();

    assert_eq!(found.format(), WorkflowFormat::Ui);
    assert_eq!(found.source, WorkflowSource::PngText("workflow".to_string()));

    let (models, loras) = models_and_loras(&found.document);
    assert_eq!(models, vec!["base.safetensors"]);
    assert_eq!(loras, vec!["ink.safetensors"]);
}

#[tokio::test]
async fn test_png_prompt_only() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("api.png");
    png_with_text(&path, &[("prompt", API_PROMPT)]);

    let found = extract_workflow(&path, MediaKind::Image, None)
        .await
        .unwrap();
    assert_eq!(found.format(), WorkflowFormat::Api);
    assert!(input_files(&found.document).is_empty());
}
