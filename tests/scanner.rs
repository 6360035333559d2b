//! Scanner Integration Tests
//!
//! Balanced-brace candidate discovery in arbitrary bytes.

use mediacat::domain::{classify, WorkflowFormat};
use mediacat::media::{scan_bytes, JsonCandidates};

#[test]
fn test_two_candidates_second_is_ui() {
    let candidates = scan_bytes(br#"prefix{"a":1}garbage{"nodes":[]}suffix"#);

    assert_eq!(candidates.len(), 2);
    assert!(classify(&candidates[0]).is_none());
    assert_eq!(
        classify(&candidates[1]).map(|d| d.format()),
        Some(WorkflowFormat::Ui)
    );
}

#[test]
fn test_unterminated_fragment_yields_nothing() {
    assert!(scan_bytes(br#"binary junk {"x":"#).is_empty());
}

#[test]
fn test_unterminated_fragment_ends_scan() {
    let candidates = scan_bytes(br#"{"ok":true} {"x": {"y": 1} trailing"#);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["ok"], true);
}

#[test]
fn test_malformed_candidate_does_not_block_later_ones() {
    let candidates = scan_bytes(br#"{not json} {"nodes": [], "links": []}"#);
    assert_eq!(candidates.len(), 1);
}

#[test]
fn test_invalid_utf8_is_tolerated() {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0xff, 0xfe, 0x00];
    bytes.extend_from_slice(br#"{"1": {"class_type": "KSampler", "inputs": {}}}"#);
    bytes.extend_from_slice(&[0xc3, 0x28, 0xa0, 0xa1]);

    let candidates = scan_bytes(&bytes);
    assert_eq!(candidates.len(), 1);
    assert_eq!(
        classify(&candidates[0]).map(|d| d.format()),
        Some(WorkflowFormat::Api)
    );
}

#[test]
fn test_iterator_is_lazy() {
    let text = r#"{"a":1}{"b":2}{"c":3}"#;
    let first: Vec<_> = JsonCandidates::new(text).take(1).collect();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["a"], 1);
}
