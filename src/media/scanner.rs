//! Balanced-brace JSON candidate scanner.
//!
//! Finds `{ ... }` spans in arbitrary bytes and yields the ones that parse
//! as JSON. Bytes are decoded lossily, so binary noise around the payload
//! never aborts a scan.

use serde_json::Value;

/// Iterator over JSON candidates embedded in text
///
/// Each `{` opens a walk that counts nested braces until the depth returns
/// to zero. Scanning resumes right after the closing brace whether or not
/// the span parsed. An unbalanced walk ends the scan.
pub struct JsonCandidates<'a> {
    text: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> JsonCandidates<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            done: false,
        }
    }
}

impl Iterator for JsonCandidates<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        while !self.done {
            let bytes = self.text.as_bytes();
            let start = match bytes[self.pos..].iter().position(|b| *b == b'{') {
                Some(offset) => self.pos + offset,
                None => {
                    self.done = true;
                    return None;
                }
            };

            let mut depth = 0usize;
            let mut end = None;
            for (i, b) in bytes[start..].iter().enumerate() {
                match b {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(start + i + 1);
                            break;
                        }
                    }
                    _ => {}
                }
            }

            let Some(end) = end else {
                // Truncated fragment
                self.done = true;
                return None;
            };

            self.pos = end;
            // Braces are ASCII, so both ends sit on char boundaries
            if let Ok(value) = serde_json::from_str::<Value>(&self.text[start..end]) {
                return Some(value);
            }
        }

        None
    }
}

/// Decode bytes (placeholder for invalid sequences) and collect every candidate
pub fn scan_bytes(bytes: &[u8]) -> Vec<Value> {
    let text = String::from_utf8_lossy(bytes);
    JsonCandidates::new(&text).collect()
}
